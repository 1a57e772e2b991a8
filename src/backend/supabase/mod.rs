pub mod dto;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use url::Url;

use crate::backend::{AuthProvider, ObjectStore, StoredObject, TodoCollection};
use crate::config::SupabaseConfig;
use crate::error::AppError;
use crate::models::{NewTodoRequest, Session, Todo, UserIdentity};

const TODO_COLUMNS: &str = "id,content,file,created_at";

/// Client for a Supabase project: GoTrue auth, PostgREST for the todo table
/// and the storage API for uploaded images.
pub struct SupabaseClient {
    client: Client,
    base_url: Url,
    config: SupabaseConfig,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AppError::Config(format!("SUPABASE_URL is invalid: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config("SUPABASE_URL must be an http(s) URL".to_string()));
        }

        let client = Client::builder().timeout(config.http_timeout).build()?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn endpoint<'a, I>(&self, segments: I) -> Result<Url, AppError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("SUPABASE_URL must be an http(s) URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn table_url(&self) -> Result<Url, AppError> {
        self.endpoint(["rest", "v1", self.config.todo_table.as_str()])
    }

    fn object_url(&self, scope: &[&str], path: &str) -> Result<Url, AppError> {
        let segments = ["storage", "v1", "object"]
            .into_iter()
            .chain(scope.iter().copied())
            .chain([self.config.storage_bucket.as_str()])
            .chain(path.split('/').filter(|s| !s.is_empty()));
        self.endpoint(segments)
    }

    fn authorized(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token))
    }
}

async fn ensure_success(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(backend_error(status, body))
}

fn backend_error(status: StatusCode, body: String) -> AppError {
    let message = serde_json::from_str::<dto::ApiErrorBody>(&body)
        .ok()
        .and_then(dto::ApiErrorBody::into_message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            }
        });

    AppError::Backend {
        status: status.as_u16(),
        message,
    }
}

/// The storage API answers a missing object with 404, or with 400 and a
/// `not_found` error body.
fn is_missing_object(status: StatusCode, body: &str) -> bool {
    match status {
        StatusCode::NOT_FOUND => true,
        StatusCode::BAD_REQUEST => serde_json::from_str::<dto::ApiErrorBody>(body)
            .is_ok_and(|error| error.is_not_found()),
        _ => false,
    }
}

fn session_expiry(token: &dto::TokenResponse, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    token
        .expires_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .or_else(|| token.expires_in.map(|secs| now + Duration::seconds(secs)))
}

#[async_trait]
impl TodoCollection for SupabaseClient {
    async fn list(&self, session: &Session) -> Result<Vec<Todo>, AppError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", TODO_COLUMNS)
            .append_pair("order", "created_at.asc");

        let response = self
            .authorized(self.client.get(url), session)
            .send()
            .await?;
        let todos = ensure_success(response).await?.json::<Vec<Todo>>().await?;
        Ok(todos)
    }

    async fn create(&self, session: &Session, request: &NewTodoRequest) -> Result<Todo, AppError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut().append_pair("select", TODO_COLUMNS);

        let response = self
            .authorized(self.client.post(url), session)
            .header("Prefer", "return=representation")
            .json(request)
            .send()
            .await?;
        let created = ensure_success(response).await?.json::<Vec<Todo>>().await?;

        created.into_iter().next().ok_or_else(|| AppError::Backend {
            status: 500,
            message: "Create returned no row".to_string(),
        })
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<(), AppError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));

        let response = self
            .authorized(self.client.delete(url), session)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for SupabaseClient {
    async fn upload(
        &self,
        session: &Session,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, AppError> {
        let url = self.object_url(&[], path)?;

        let response = self
            .authorized(self.client.post(url), session)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        let uploaded = ensure_success(response)
            .await?
            .json::<dto::ObjectUploadResponse>()
            .await?;

        // The service reports `<bucket>/<path>`.
        let bucket_prefix = format!("{}/", self.config.storage_bucket);
        let stored = uploaded
            .key
            .map(|key| match key.strip_prefix(&bucket_prefix) {
                Some(path) => path.to_string(),
                None => key,
            })
            .unwrap_or_else(|| path.to_string());
        Ok(stored)
    }

    async fn remove(&self, session: &Session, path: &str) -> Result<(), AppError> {
        let url = self.object_url(&[], path)?;

        let response = self
            .authorized(self.client.delete(url), session)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if is_missing_object(status, &body) {
            tracing::debug!("Object {} was already removed", path);
            return Ok(());
        }
        Err(backend_error(status, body))
    }

    async fn read(&self, session: &Session, path: &str) -> Result<StoredObject, AppError> {
        let url = self.object_url(&["authenticated"], path)?;

        let response = self
            .authorized(self.client.get(url), session)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?;

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let mut url = self.endpoint(["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .client
            .post(url)
            .header("apikey", &self.config.anon_key)
            .json(&dto::PasswordGrantRequest { email, password })
            .send()
            .await?;
        let token = ensure_success(response)
            .await?
            .json::<dto::TokenResponse>()
            .await?;

        let expires_at = session_expiry(&token, Utc::now());
        tracing::info!("Signed in as {}", token.user.id);

        Ok(Session {
            access_token: token.access_token,
            user: UserIdentity {
                id: token.user.id,
                email: token.user.email,
            },
            expires_at,
        })
    }

    async fn sign_out(&self, session: &Session) -> Result<(), AppError> {
        let url = self.endpoint(["auth", "v1", "logout"])?;

        let response = self
            .authorized(self.client.post(url), session)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
