pub mod notice;
pub mod page;

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{error, info, warn};

use crate::backend::{Backend, LiveQuery, Snapshot, StoredObject, Subscription};
use crate::config::ClientConfig;
use crate::error::AppError;
use crate::models::{NewTodoRequest, Session, Todo};
use crate::upload::key::upload_content_type;
use crate::upload::{FileUpload, UploadState, UploadWidget, content_key, is_accepted_image};

pub use notice::{MISSING_FILE_ALERT, Notice, NoticeLevel};
pub use page::{Page, TodoItem, TodosPage};

#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Prepended to every content key, e.g. `public/`.
    pub storage_prefix: String,
    pub poll_interval: Duration,
}

impl From<&ClientConfig> for AppOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            storage_prefix: config.storage_prefix.clone(),
            poll_interval: config.poll_interval,
        }
    }
}

#[derive(Debug)]
pub enum CreateOutcome {
    SignedOut,
    /// Empty text, nothing was sent.
    Ignored,
    /// No file staged; the user was alerted.
    MissingFile,
    Created(Todo),
    Failed(AppError),
}

#[derive(Debug)]
pub enum DeleteOutcome {
    SignedOut,
    Deleted,
    /// The stored file could not be removed, so the record was left alone.
    FileRemovalFailed(AppError),
    RecordRemovalFailed(AppError),
}

/// Draft text and upload widget as currently shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub draft: String,
    pub upload: UploadState,
}

struct SignedInView {
    session: Session,
    draft: String,
    upload: UploadWidget,
    snapshot: watch::Receiver<Snapshot>,
    subscription: Subscription,
}

/// State and operations behind the todo page.
///
/// Locks are only held to read or apply state; backend calls run without
/// them so the page stays usable while a call is pending.
pub struct TodoApp {
    backend: Backend,
    options: AppOptions,
    view: RwLock<Option<SignedInView>>,
    notices: Mutex<Vec<Notice>>,
}

impl TodoApp {
    pub fn new(backend: Backend, options: AppOptions) -> Self {
        Self {
            backend,
            options,
            view: RwLock::new(None),
            notices: Mutex::new(Vec::new()),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AppError> {
        if email.trim().is_empty() || password.is_empty() {
            let err = AppError::BadRequest("Email and password are required".to_string());
            self.notify(Notice::error(err.user_message())).await;
            return Err(err);
        }

        let session = match self.backend.auth.sign_in(email.trim(), password).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.notify(Notice::error(e.user_message())).await;
                return Err(e);
            }
        };

        let (subscription, snapshot) = LiveQuery::new(
            self.backend.todos.clone(),
            session.clone(),
            self.options.poll_interval,
        )
        .subscribe();

        info!("Session opened for user {}", session.user.id);
        let previous = self.view.write().await.replace(SignedInView {
            session,
            draft: String::new(),
            upload: UploadWidget::new(),
            snapshot,
            subscription,
        });
        // Closes the previous live query, if any.
        drop(previous);
        Ok(())
    }

    /// Ends the session locally, then revokes it at the backend.
    pub async fn sign_out(&self) -> Result<(), AppError> {
        let Some(view) = self.view.write().await.take() else {
            return Ok(());
        };
        let session = view.session.clone();
        drop(view);

        info!("Session closed for user {}", session.user.id);
        if let Err(e) = self.backend.auth.sign_out(&session).await {
            warn!("Sign-out was not acknowledged by the backend: {}", e);
            self.notify(Notice::error(e.user_message())).await;
            return Err(e);
        }
        Ok(())
    }

    /// Closes the live query. Used on shutdown.
    pub async fn close(&self) {
        if self.view.write().await.take().is_some() {
            info!("Closed the signed-in view");
        }
    }

    pub async fn is_signed_in(&self) -> bool {
        self.active_session().await.is_some()
    }

    pub async fn set_draft(&self, text: &str) -> bool {
        let mut guard = self.view.write().await;
        match guard.as_mut() {
            Some(view) => {
                view.draft = text.to_string();
                true
            }
            None => false,
        }
    }

    pub async fn form_state(&self) -> Option<FormState> {
        let guard = self.view.read().await;
        guard.as_ref().map(|view| FormState {
            draft: view.draft.clone(),
            upload: view.upload.state().clone(),
        })
    }

    pub async fn pending_file(&self) -> Option<String> {
        let guard = self.view.read().await;
        guard
            .as_ref()
            .and_then(|view| view.upload.staged_key().map(String::from))
    }

    /// Hashes the selected file, uploads it under its content key and stages
    /// the key the store returned.
    pub async fn stage_file(&self, file: FileUpload) -> Result<String, AppError> {
        let session = self.active_session().await.ok_or(AppError::Unauthorized)?;
        let FileUpload {
            file_name,
            content_type,
            bytes,
        } = file;

        let selected = {
            let mut guard = self.view.write().await;
            let view = guard.as_mut().ok_or(AppError::Unauthorized)?;
            if is_accepted_image(content_type.as_deref(), &file_name) {
                view.upload.select(&file_name)
            } else {
                let err = AppError::BadRequest(format!("{} is not an image", file_name));
                if matches!(view.upload.state(), UploadState::Empty | UploadState::Error { .. }) {
                    view.upload.fail(err.user_message());
                }
                Err(err)
            }
        };
        if let Err(e) = selected {
            self.notify(Notice::error(e.user_message())).await;
            return Err(e);
        }

        let hashed = bytes.clone();
        let name = file_name.clone();
        let result = match tokio::task::spawn_blocking(move || content_key(&hashed, &name)).await {
            Ok(key) => {
                let path = format!("{}{}", self.options.storage_prefix, key);
                let content_type = upload_content_type(content_type.as_deref(), &file_name);
                self.backend
                    .objects
                    .upload(&session, &path, bytes, &content_type)
                    .await
            }
            Err(e) => {
                error!("Hashing {} failed: {}", file_name, e);
                Err(AppError::InternalServerError)
            }
        };

        let applied = {
            let mut guard = self.view.write().await;
            let view = guard.as_mut().ok_or(AppError::Unauthorized)?;
            match result {
                Ok(stored) => view.upload.complete(stored.clone()).map(|_| stored),
                Err(e) => {
                    view.upload.fail(e.user_message());
                    Err(e)
                }
            }
        };

        match applied {
            Ok(stored) => {
                info!("Staged {} as {}", file_name, stored);
                Ok(stored)
            }
            Err(e) => {
                warn!("Staging {} failed: {}", file_name, e);
                self.notify(Notice::error(e.user_message())).await;
                Err(e)
            }
        }
    }

    /// Clears the staged file. The uploaded object is kept.
    pub async fn remove_file(&self) -> bool {
        let mut guard = self.view.write().await;
        match guard.as_mut() {
            Some(view) => {
                view.upload.remove();
                true
            }
            None => false,
        }
    }

    pub async fn create_todo(&self) -> CreateOutcome {
        let Some(session) = self.active_session().await else {
            return CreateOutcome::SignedOut;
        };

        let request = {
            let guard = self.view.read().await;
            let Some(view) = guard.as_ref() else {
                return CreateOutcome::SignedOut;
            };
            if view.draft.is_empty() {
                return CreateOutcome::Ignored;
            }
            view.upload.staged_key().map(|file| NewTodoRequest {
                content: view.draft.clone(),
                file: file.to_string(),
            })
        };
        let Some(request) = request else {
            self.notify(Notice::alert(MISSING_FILE_ALERT)).await;
            return CreateOutcome::MissingFile;
        };

        match self.backend.todos.create(&session, &request).await {
            Ok(todo) => {
                info!("Created todo {}", todo.id);
                // Input made while the request was pending stays in the form.
                if let Some(view) = self.view.write().await.as_mut() {
                    if view.draft == request.content {
                        view.draft.clear();
                    }
                    if view.upload.staged_key() == Some(request.file.as_str()) {
                        view.upload.submitted();
                    }
                    view.subscription.refresh();
                }
                self.notify(Notice::success("Todo added")).await;
                CreateOutcome::Created(todo)
            }
            Err(e) => {
                error!("Creating todo failed: {}", e);
                self.notify(Notice::error(format!(
                    "Could not add the todo: {}",
                    e.user_message()
                )))
                .await;
                CreateOutcome::Failed(e)
            }
        }
    }

    /// Removes the todo's stored file, then the todo itself. The record is
    /// only removed once the file is gone.
    pub async fn delete_todo(&self, todo: &Todo) -> DeleteOutcome {
        let Some(session) = self.active_session().await else {
            return DeleteOutcome::SignedOut;
        };

        if let Some(file) = todo.file_key() {
            if let Err(e) = self.backend.objects.remove(&session, file).await {
                error!("Removing file {} of todo {} failed: {}", file, todo.id, e);
                self.notify(Notice::error(format!(
                    "Could not delete the image: {}",
                    e.user_message()
                )))
                .await;
                return DeleteOutcome::FileRemovalFailed(e);
            }
        }

        if let Err(e) = self.backend.todos.delete(&session, &todo.id).await {
            error!("Deleting todo {} failed: {}", todo.id, e);
            self.notify(Notice::error(format!(
                "Could not delete the todo: {}",
                e.user_message()
            )))
            .await;
            return DeleteOutcome::RecordRemovalFailed(e);
        }

        info!("Deleted todo {}", todo.id);
        if let Some(view) = self.view.read().await.as_ref() {
            view.subscription.refresh();
        }
        DeleteOutcome::Deleted
    }

    /// Latest snapshot of the live query.
    pub async fn snapshot(&self) -> Option<Snapshot> {
        let guard = self.view.read().await;
        guard.as_ref().map(|view| view.snapshot.borrow().clone())
    }

    pub async fn todos(&self) -> Vec<Todo> {
        self.snapshot()
            .await
            .map(|snapshot| snapshot.items)
            .unwrap_or_default()
    }

    pub async fn find_todo(&self, id: &str) -> Option<Todo> {
        self.todos().await.into_iter().find(|todo| todo.id == id)
    }

    /// Waits until the live query publishes a snapshot matching `predicate`.
    pub async fn wait_for_snapshot<F>(&self, predicate: F) -> Option<Snapshot>
    where
        F: Fn(&Snapshot) -> bool,
    {
        let mut rx = {
            let guard = self.view.read().await;
            guard.as_ref()?.snapshot.clone()
        };
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if predicate(&snapshot) {
                return Some(snapshot);
            }
            rx.changed().await.ok()?;
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<StoredObject, AppError> {
        let session = self.active_session().await.ok_or(AppError::Unauthorized)?;
        self.backend.objects.read(&session, path).await
    }

    /// Builds the page and consumes pending notices.
    pub async fn page(&self) -> Page {
        let signed_in = self.active_session().await.is_some();
        let todos_page = if signed_in {
            let guard = self.view.read().await;
            guard.as_ref().map(|view| {
                let snapshot = view.snapshot.borrow().clone();
                TodosPage {
                    user: view.session.user.clone(),
                    draft: view.draft.clone(),
                    upload: view.upload.state().clone(),
                    todos: snapshot.items.into_iter().map(TodoItem::from).collect(),
                    synced: snapshot.is_synced,
                    notices: Vec::new(),
                }
            })
        } else {
            None
        };

        let notices = self.take_notices().await;
        match todos_page {
            Some(page) => Page::Todos(TodosPage { notices, ..page }),
            None => Page::SignIn { notices },
        }
    }

    pub async fn notify(&self, notice: Notice) {
        self.notices.lock().await.push(notice);
    }

    pub async fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().await)
    }

    /// Session of the signed-in view. An expired session closes the view.
    async fn active_session(&self) -> Option<Session> {
        {
            let guard = self.view.read().await;
            let view = guard.as_ref()?;
            if !view.session.is_expired(Utc::now()) {
                return Some(view.session.clone());
            }
        }

        let expired = {
            let mut guard = self.view.write().await;
            let is_expired = guard
                .as_ref()
                .is_some_and(|view| view.session.is_expired(Utc::now()));
            if is_expired { guard.take() } else { None }
        };
        if let Some(view) = expired {
            info!("Session of user {} expired", view.session.user.id);
            self.notify(Notice::info("Your session expired, please sign in again"))
                .await;
        }
        None
    }
}
