pub mod live_query;
pub mod memory;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::AppError;
use crate::models::{NewTodoRequest, Session, Todo};

pub use live_query::{LiveQuery, Snapshot, Subscription};
pub use memory::InMemoryBackend;
pub use supabase::SupabaseClient;

#[async_trait]
pub trait TodoCollection: Send + Sync {
    /// Current items visible to the session, in backend order.
    async fn list(&self, session: &Session) -> Result<Vec<Todo>, AppError>;
    async fn create(&self, session: &Session, request: &NewTodoRequest) -> Result<Todo, AppError>;
    async fn delete(&self, session: &Session, id: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores the bytes at `path` and returns the path actually used.
    async fn upload(
        &self,
        session: &Session,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, AppError>;
    /// Removing an object that does not exist succeeds.
    async fn remove(&self, session: &Session, path: &str) -> Result<(), AppError>;
    async fn read(&self, session: &Session, path: &str) -> Result<StoredObject, AppError>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError>;
    async fn sign_out(&self, session: &Session) -> Result<(), AppError>;
}

/// The managed platform as seen by the client.
#[derive(Clone)]
pub struct Backend {
    pub todos: Arc<dyn TodoCollection>,
    pub objects: Arc<dyn ObjectStore>,
    pub auth: Arc<dyn AuthProvider>,
}

impl Backend {
    /// One service implementing the whole contract.
    pub fn from_service<T>(service: Arc<T>) -> Self
    where
        T: TodoCollection + ObjectStore + AuthProvider + 'static,
    {
        Self {
            todos: service.clone(),
            objects: service.clone(),
            auth: service,
        }
    }
}
