use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct PasswordGrantRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

#[derive(Debug, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectUploadResponse {
    #[serde(rename = "Key")]
    pub key: Option<String>,
}

/// Error bodies differ between the auth, rest and storage services; each of
/// them fills some of these fields.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    /// Sent by the storage API, as a string or a number.
    #[serde(default, rename = "statusCode")]
    pub status_code: Option<serde_json::Value>,
}

impl ApiErrorBody {
    pub fn is_not_found(&self) -> bool {
        let status_404 = match &self.status_code {
            Some(serde_json::Value::String(code)) => code == "404",
            Some(serde_json::Value::Number(code)) => code.as_u64() == Some(404),
            _ => false,
        };
        status_404 || self.error.as_deref().is_some_and(|e| e.eq_ignore_ascii_case("not_found"))
    }

    pub fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.message)
            .or(self.msg)
            .or(self.details)
            .or(self.error)
    }
}
