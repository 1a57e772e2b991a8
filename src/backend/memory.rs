use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::{AuthProvider, ObjectStore, StoredObject, TodoCollection};
use crate::error::AppError;
use crate::models::{NewTodoRequest, Session, Todo, UserIdentity};

const TOKEN_PREFIX: &str = "memory-token-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignIn,
    SignOut,
    List,
    Create,
    Delete,
    Upload,
    Remove,
    Read,
}

/// A call the backend received. Listing is not journaled, the live query
/// does it continuously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    SignIn { email: String },
    SignOut { user_id: String },
    Create(NewTodoRequest),
    Delete { id: String },
    Upload { path: String },
    Remove { path: String },
    Read { path: String },
}

struct Account {
    user_id: String,
    password: String,
}

struct StoredTodo {
    owner: String,
    todo: Todo,
}

#[derive(Default)]
struct State {
    todos: Vec<StoredTodo>,
    objects: HashMap<String, StoredObject>,
    calls: Vec<BackendCall>,
    failing: HashSet<Operation>,
}

/// Process-local implementation of the whole backend contract, used for
/// local development and as a test double.
#[derive(Default)]
pub struct InMemoryBackend {
    accounts: HashMap<String, Account>,
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, email: &str, password: &str) -> Self {
        let user_id = Uuid::new_v4().to_string();
        self.accounts.insert(
            email.to_string(),
            Account {
                user_id,
                password: password.to_string(),
            },
        );
        self
    }

    /// Session of a registered user, without going through sign-in.
    pub fn session_for(&self, email: &str) -> Option<Session> {
        self.accounts
            .get(email)
            .map(|account| self.session(email, account))
    }

    /// Makes every later call of `operation` fail until [`Self::recover`].
    pub async fn fail_on(&self, operation: Operation) {
        self.state.lock().await.failing.insert(operation);
    }

    pub async fn recover(&self, operation: Operation) {
        self.state.lock().await.failing.remove(&operation);
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn object(&self, path: &str) -> Option<StoredObject> {
        self.state.lock().await.objects.get(path).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    fn session(&self, email: &str, account: &Account) -> Session {
        Session {
            access_token: format!("{}{}", TOKEN_PREFIX, account.user_id),
            user: UserIdentity {
                id: account.user_id.clone(),
                email: Some(email.to_string()),
            },
            expires_at: None,
        }
    }

    fn authorize(&self, session: &Session) -> Result<String, AppError> {
        let user_id = session
            .access_token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(AppError::Unauthorized)?;
        if self.accounts.values().any(|a| a.user_id == user_id) {
            Ok(user_id.to_string())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

fn check(state: &State, operation: Operation) -> Result<(), AppError> {
    if state.failing.contains(&operation) {
        return Err(AppError::Backend {
            status: 503,
            message: format!("{:?} is unavailable", operation),
        });
    }
    Ok(())
}

#[async_trait]
impl TodoCollection for InMemoryBackend {
    async fn list(&self, session: &Session) -> Result<Vec<Todo>, AppError> {
        let owner = self.authorize(session)?;
        let state = self.state.lock().await;
        check(&state, Operation::List)?;

        Ok(state
            .todos
            .iter()
            .filter(|stored| stored.owner == owner)
            .map(|stored| stored.todo.clone())
            .collect())
    }

    async fn create(&self, session: &Session, request: &NewTodoRequest) -> Result<Todo, AppError> {
        let owner = self.authorize(session)?;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Create(request.clone()));
        check(&state, Operation::Create)?;

        let todo = Todo {
            id: Uuid::new_v4().to_string(),
            content: request.content.clone(),
            file: Some(request.file.clone()),
            created_at: Some(Utc::now()),
        };
        state.todos.push(StoredTodo {
            owner,
            todo: todo.clone(),
        });
        Ok(todo)
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<(), AppError> {
        let owner = self.authorize(session)?;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Delete { id: id.to_string() });
        check(&state, Operation::Delete)?;

        state
            .todos
            .retain(|stored| !(stored.owner == owner && stored.todo.id == id));
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryBackend {
    async fn upload(
        &self,
        session: &Session,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, AppError> {
        self.authorize(session)?;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Upload {
            path: path.to_string(),
        });
        check(&state, Operation::Upload)?;

        state.objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(path.to_string())
    }

    async fn remove(&self, session: &Session, path: &str) -> Result<(), AppError> {
        self.authorize(session)?;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Remove {
            path: path.to_string(),
        });
        check(&state, Operation::Remove)?;

        state.objects.remove(path);
        Ok(())
    }

    async fn read(&self, session: &Session, path: &str) -> Result<StoredObject, AppError> {
        self.authorize(session)?;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::Read {
            path: path.to_string(),
        });
        check(&state, Operation::Read)?;

        state.objects.get(path).cloned().ok_or(AppError::NotFound)
    }
}

#[async_trait]
impl AuthProvider for InMemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::SignIn {
            email: email.to_string(),
        });
        check(&state, Operation::SignIn)?;

        match self.accounts.get(email) {
            Some(account) if account.password == password => Ok(self.session(email, account)),
            _ => Err(AppError::Backend {
                status: 400,
                message: "Invalid login credentials".to_string(),
            }),
        }
    }

    async fn sign_out(&self, session: &Session) -> Result<(), AppError> {
        let user_id = self.authorize(session)?;
        let mut state = self.state.lock().await;
        state.calls.push(BackendCall::SignOut { user_id });
        check(&state, Operation::SignOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str, file: &str) -> NewTodoRequest {
        NewTodoRequest {
            content: content.to_string(),
            file: file.to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let backend = InMemoryBackend::new().with_user("me@example.com", "pw");

        let session = backend.sign_in("me@example.com", "pw").await.unwrap();
        assert_eq!(session.user.email.as_deref(), Some("me@example.com"));

        let err = backend.sign_in("me@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AppError::Backend { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_todos_are_scoped_to_owner() {
        let backend = InMemoryBackend::new()
            .with_user("a@example.com", "pw")
            .with_user("b@example.com", "pw");
        let alice = backend.session_for("a@example.com").unwrap();
        let bob = backend.session_for("b@example.com").unwrap();

        backend.create(&alice, &request("alice's", "public/a.png")).await.unwrap();
        backend.create(&bob, &request("bob's", "public/b.png")).await.unwrap();

        let items = backend.list(&alice).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "alice's");
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let backend = InMemoryBackend::new().with_user("me@example.com", "pw");
        let mut session = backend.session_for("me@example.com").unwrap();
        session.access_token = "forged".to_string();

        assert!(matches!(backend.list(&session).await, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_upload_is_idempotent_per_path() {
        let backend = InMemoryBackend::new().with_user("me@example.com", "pw");
        let session = backend.session_for("me@example.com").unwrap();

        for _ in 0..2 {
            let path = backend
                .upload(&session, "public/abc.png", Bytes::from_static(b"img"), "image/png")
                .await
                .unwrap();
            assert_eq!(path, "public/abc.png");
        }
        assert_eq!(backend.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_removing_missing_object_succeeds() {
        let backend = InMemoryBackend::new().with_user("me@example.com", "pw");
        let session = backend.session_for("me@example.com").unwrap();
        backend
            .upload(&session, "public/abc.png", Bytes::from_static(b"img"), "image/png")
            .await
            .unwrap();

        backend.remove(&session, "public/abc.png").await.unwrap();
        backend.remove(&session, "public/abc.png").await.unwrap();
        assert_eq!(backend.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = InMemoryBackend::new().with_user("me@example.com", "pw");
        let session = backend.session_for("me@example.com").unwrap();
        backend
            .upload(&session, "public/abc.png", Bytes::from_static(b"img"), "image/png")
            .await
            .unwrap();

        backend.fail_on(Operation::Remove).await;
        assert!(backend.remove(&session, "public/abc.png").await.is_err());
        assert!(backend.object("public/abc.png").await.is_some());

        backend.recover(Operation::Remove).await;
        backend.remove(&session, "public/abc.png").await.unwrap();
        assert!(backend.object("public/abc.png").await.is_none());

        assert_eq!(
            backend.calls().await,
            vec![
                BackendCall::Upload { path: "public/abc.png".to_string() },
                BackendCall::Remove { path: "public/abc.png".to_string() },
                BackendCall::Remove { path: "public/abc.png".to_string() },
            ]
        );
    }
}
