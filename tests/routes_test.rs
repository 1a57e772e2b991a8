use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use pictodo::api::router;
use pictodo::app::{AppOptions, TodoApp};
use pictodo::backend::memory::BackendCall;
use pictodo::backend::{Backend, InMemoryBackend};
use pictodo::models::Todo;
use pictodo::state::AppState;
use pictodo::upload::content_key;
use pictodo::view::Renderer;
use tower::ServiceExt;

const EMAIL: &str = "me@example.com";
const PASSWORD: &str = "pw";
const BOUNDARY: &str = "pictodo-test-boundary";
const CAT_PNG: &[u8] = b"\x89PNG\r\n\x1a\nsleepy cat";

struct Harness {
    backend: Arc<InMemoryBackend>,
    app: Arc<TodoApp>,
    router: Router,
}

fn harness() -> Harness {
    let backend = Arc::new(InMemoryBackend::new().with_user(EMAIL, PASSWORD));
    let app = Arc::new(TodoApp::new(
        Backend::from_service(backend.clone()),
        AppOptions {
            storage_prefix: "public/".to_string(),
            poll_interval: Duration::from_millis(20),
        },
    ));
    let state = AppState {
        app: app.clone(),
        renderer: Arc::new(Renderer::new().expect("Failed to load templates")),
        max_upload_bytes: 1024 * 1024,
    };
    Harness {
        backend,
        app,
        router: router(state),
    }
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        (status, body.to_vec())
    }

    async fn get_page(&self) -> String {
        let (status, body) = self
            .send(Request::get("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        String::from_utf8(body).expect("page is utf-8")
    }

    async fn sign_in(&self) {
        let request = Request::post("/sign-in")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("email={}&password={}", "me%40example.com", PASSWORD)))
            .unwrap();
        let (status, _) = self.send(request).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
    }

    async fn post_form(&self, uri: &str, content: &str, file: Option<(&str, &[u8])>) -> StatusCode {
        let request = Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(content, file)))
            .unwrap();
        self.send(request).await.0
    }
}

fn multipart_body(content: &str, file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\n{}\r\n",
            BOUNDARY, content
        )
        .as_bytes(),
    );
    let (file_name, bytes) = file.unwrap_or(("", b""));
    let content_type = if file_name.is_empty() {
        "application/octet-stream"
    } else {
        "image/png"
    };
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            BOUNDARY, file_name, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, _) = h
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_signed_out_visitor_only_sees_sign_in() {
    let h = harness();

    let page = h.get_page().await;
    assert!(page.contains("action=\"/sign-in\""));
    assert!(!page.contains("<h1>My todos</h1>"));

    let (status, _) = h
        .send(Request::get("/api/todos").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(h.post_form("/todos", "Task", None).await, StatusCode::SEE_OTHER);
    assert!(h.backend.calls().await.is_empty());
}

#[tokio::test]
async fn test_sign_in_and_out() {
    let h = harness();
    h.sign_in().await;

    let page = h.get_page().await;
    assert!(page.contains("<h1>My todos</h1>"));
    assert!(page.contains("me@example.com"));

    let (status, _) = h
        .send(Request::post("/sign-out").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(!h.app.is_signed_in().await);
    assert!(h.get_page().await.contains("action=\"/sign-in\""));
}

#[tokio::test]
async fn test_create_without_file_shows_alert() {
    let h = harness();
    h.sign_in().await;

    assert_eq!(h.post_form("/todos", "Task", None).await, StatusCode::SEE_OTHER);

    let page = h.get_page().await;
    assert!(page.contains("<dialog open>"));
    assert!(page.contains("Please upload a file"));
    assert!(page.contains("value=\"Task\""));
    assert!(
        !h.backend
            .calls()
            .await
            .iter()
            .any(|call| matches!(call, BackendCall::Create(_)))
    );

    // Notices are shown once.
    assert!(!h.get_page().await.contains("<dialog open>"));
}

#[tokio::test]
async fn test_upload_create_view_and_delete() {
    let h = harness();
    h.sign_in().await;
    let key = format!("public/{}", content_key(CAT_PNG, "cat.png"));

    assert_eq!(
        h.post_form("/upload", "Buy milk", Some(("cat.png", CAT_PNG))).await,
        StatusCode::SEE_OTHER
    );
    let page = h.get_page().await;
    assert!(page.contains("cat.png uploaded"));
    assert!(page.contains("value=\"Buy milk\""));
    assert_eq!(h.app.pending_file().await, Some(key.clone()));

    assert_eq!(h.post_form("/todos", "Buy milk", None).await, StatusCode::SEE_OTHER);
    h.app
        .wait_for_snapshot(|s| s.items.len() == 1)
        .await
        .expect("still signed in");

    let (status, body) = h
        .send(Request::get("/api/todos").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let todos: Vec<Todo> = serde_json::from_slice(&body).expect("todo list json");
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].content, "Buy milk");
    assert_eq!(todos[0].file.as_deref(), Some(key.as_str()));

    let response = h
        .router
        .clone()
        .oneshot(
            Request::get(format!("/files/{}", key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), CAT_PNG);

    let (status, _) = h
        .send(
            Request::post(format!("/todos/{}/delete", todos[0].id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let order: Vec<BackendCall> = h
        .backend
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, BackendCall::Remove { .. } | BackendCall::Delete { .. }))
        .collect();
    assert_eq!(
        order,
        vec![
            BackendCall::Remove { path: key },
            BackendCall::Delete {
                id: todos[0].id.clone()
            },
        ]
    );
}

#[tokio::test]
async fn test_remove_file_clears_staged_upload() {
    let h = harness();
    h.sign_in().await;
    h.post_form("/upload", "", Some(("cat.png", CAT_PNG))).await;
    assert!(h.app.pending_file().await.is_some());

    assert_eq!(h.post_form("/upload/remove", "", None).await, StatusCode::SEE_OTHER);

    assert_eq!(h.app.pending_file().await, None);
    assert_eq!(h.backend.object_count().await, 1);
}

#[tokio::test]
async fn test_delete_unknown_todo_redirects_with_notice() {
    let h = harness();
    h.sign_in().await;

    let (status, _) = h
        .send(
            Request::post("/todos/missing/delete")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let page = h.get_page().await;
    assert!(page.contains("That todo no longer exists"));
    assert!(
        !h.backend
            .calls()
            .await
            .iter()
            .any(|call| matches!(call, BackendCall::Remove { .. } | BackendCall::Delete { .. }))
    );
}
