use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_TODO_TABLE: &str = "todos";
const DEFAULT_STORAGE_BUCKET: &str = "todoBucket";
const DEFAULT_STORAGE_PREFIX: &str = "public/";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Supabase,
    Memory,
}

#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub todo_table: String,
    pub storage_bucket: String,
    pub http_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct DemoAccount {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub backend: BackendKind,
    pub supabase: Option<SupabaseConfig>,
    pub demo_account: Option<DemoAccount>,
    pub storage_prefix: String,
    pub poll_interval: Duration,
    pub max_upload_bytes: usize,
    pub bind_addr: SocketAddr,
}

impl ClientConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = match var("PICTODO_BACKEND").as_deref() {
            None | Some("supabase") => BackendKind::Supabase,
            Some("memory") => BackendKind::Memory,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "PICTODO_BACKEND must be `supabase` or `memory`, got `{}`",
                    other
                )));
            }
        };

        let supabase = match backend {
            BackendKind::Supabase => {
                let url = var("SUPABASE_URL")
                    .ok_or_else(|| AppError::Config("SUPABASE_URL is not set".to_string()))?;
                let anon_key = var("SUPABASE_ANON_KEY")
                    .ok_or_else(|| AppError::Config("SUPABASE_ANON_KEY is not set".to_string()))?;
                Some(SupabaseConfig {
                    url,
                    anon_key,
                    todo_table: var("TODO_TABLE").unwrap_or_else(|| DEFAULT_TODO_TABLE.to_string()),
                    storage_bucket: var("STORAGE_BUCKET")
                        .unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
                    http_timeout: Duration::from_secs(parse_or(
                        var("HTTP_TIMEOUT_SECS"),
                        "HTTP_TIMEOUT_SECS",
                        DEFAULT_HTTP_TIMEOUT_SECS,
                    )?),
                })
            }
            BackendKind::Memory => None,
        };

        let demo_account = match (var("DEMO_EMAIL"), var("DEMO_PASSWORD")) {
            (Some(email), Some(password)) => Some(DemoAccount { email, password }),
            _ => None,
        };

        let mut storage_prefix =
            var("STORAGE_PREFIX").unwrap_or_else(|| DEFAULT_STORAGE_PREFIX.to_string());
        if !storage_prefix.is_empty() && !storage_prefix.ends_with('/') {
            storage_prefix.push('/');
        }

        let poll_interval_ms = parse_or(var("POLL_INTERVAL_MS"), "POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        if poll_interval_ms == 0 {
            return Err(AppError::Config("POLL_INTERVAL_MS must be greater than zero".to_string()));
        }

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is invalid: {}", e)))?;

        Ok(Self {
            backend,
            supabase,
            demo_account,
            storage_prefix,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_upload_bytes: parse_or(var("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            bind_addr,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, AppError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{} is not a valid number: {}", key, raw))),
        None => Ok(default),
    }
}
