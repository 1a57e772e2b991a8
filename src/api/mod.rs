use axum::Json;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Form, Multipart, Path};
use axum::http::header;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use bytes::Bytes;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::app::Notice;
use crate::error::AppError;
use crate::models::Todo;
use crate::state::AppState;
use crate::upload::FileUpload;

#[derive(Deserialize)]
struct SignInForm {
    email: String,
    password: String,
}

/// Fields of the todo form. The file input is empty unless a file was chosen.
#[derive(Default)]
struct TodoForm {
    content: Option<String>,
    file: Option<FileUpload>,
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/sign-in", post(sign_in))
        .route("/sign-out", post(sign_out))
        .route("/upload", post(upload_file))
        .route("/upload/remove", post(remove_file))
        .route("/todos", post(create_todo))
        .route("/todos/{id}/delete", post(delete_todo))
        .route("/files/{*path}", get(read_file))
        .route("/api/todos", get(list_todos))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let page = state.app.page().await;
    Ok(Html(state.renderer.render(&page)?))
}

async fn sign_in(State(state): State<AppState>, Form(form): Form<SignInForm>) -> Redirect {
    // Failures are already queued as notices for the next render.
    let _ = state.app.sign_in(&form.email, &form.password).await;
    Redirect::to("/")
}

async fn sign_out(State(state): State<AppState>) -> Redirect {
    let _ = state.app.sign_out().await;
    Redirect::to("/")
}

async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let form = read_todo_form(multipart).await?;
    keep_draft(&state, &form).await;

    match form.file {
        Some(file) => {
            let _ = state.app.stage_file(file).await;
        }
        None => {
            if state.app.is_signed_in().await {
                state
                    .app
                    .notify(Notice::error("Choose an image to upload"))
                    .await;
            }
        }
    }
    Ok(Redirect::to("/"))
}

async fn remove_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let form = read_todo_form(multipart).await?;
    keep_draft(&state, &form).await;
    state.app.remove_file().await;
    Ok(Redirect::to("/"))
}

async fn create_todo(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let form = read_todo_form(multipart).await?;
    keep_draft(&state, &form).await;
    state.app.create_todo().await;
    Ok(Redirect::to("/"))
}

async fn delete_todo(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    if !state.app.is_signed_in().await {
        return Redirect::to("/");
    }
    match state.app.find_todo(&id).await {
        Some(todo) => {
            state.app.delete_todo(&todo).await;
        }
        None => {
            tracing::debug!("Delete of unknown todo {}", id);
            state
                .app
                .notify(Notice::error("That todo no longer exists"))
                .await;
        }
    }
    Redirect::to("/")
}

async fn read_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let object = state.app.read_file(&path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, object.content_type),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        Body::from(object.bytes),
    )
        .into_response())
}

async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, AppError> {
    if !state.app.is_signed_in().await {
        return Err(AppError::Unauthorized);
    }
    Ok(Json(state.app.todos().await))
}

async fn keep_draft(state: &AppState, form: &TodoForm) {
    if let Some(content) = &form.content {
        state.app.set_draft(content).await;
    }
}

async fn read_todo_form(mut multipart: Multipart) -> Result<TodoForm, AppError> {
    let mut form = TodoForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to parse form data: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "content" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read text: {}", e)))?;
                form.content = Some(text);
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(String::from);
                let bytes: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;
                // Browsers send an empty part when no file was chosen.
                if !file_name.is_empty() || !bytes.is_empty() {
                    form.file = Some(FileUpload {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            }
            other => {
                tracing::debug!("Ignoring form field {}", other);
            }
        }
    }

    Ok(form)
}
