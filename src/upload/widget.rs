use serde::Serialize;

use crate::error::AppError;

/// State of the single-file upload widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadState {
    #[default]
    Empty,
    Hashing { file_name: String },
    Staged { key: String, file_name: String },
    Error { reason: String },
}

#[derive(Debug, Default)]
pub struct UploadWidget {
    state: UploadState,
}

impl UploadWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Key of the uploaded file waiting to be attached to a new todo.
    pub fn staged_key(&self) -> Option<&str> {
        match &self.state {
            UploadState::Staged { key, .. } => Some(key),
            _ => None,
        }
    }

    /// A file was selected. Only one file is held at a time.
    pub fn select(&mut self, file_name: &str) -> Result<(), AppError> {
        match &self.state {
            UploadState::Empty | UploadState::Error { .. } => {
                self.state = UploadState::Hashing {
                    file_name: file_name.to_string(),
                };
                Ok(())
            }
            UploadState::Hashing { file_name: busy } => Err(AppError::BadRequest(format!(
                "Still processing {}",
                busy
            ))),
            UploadState::Staged { file_name: staged, .. } => Err(AppError::BadRequest(format!(
                "Remove {} before choosing another file",
                staged
            ))),
        }
    }

    /// Hashing and upload finished with the key the store reported.
    pub fn complete(&mut self, key: String) -> Result<(), AppError> {
        match &self.state {
            UploadState::Hashing { file_name } => {
                self.state = UploadState::Staged {
                    key,
                    file_name: file_name.clone(),
                };
                Ok(())
            }
            // The file was removed while it was still being processed.
            _ => Err(AppError::BadRequest("Upload was cancelled".to_string())),
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = UploadState::Error {
            reason: reason.into(),
        };
    }

    /// Clears the widget. Does not touch anything already uploaded.
    pub fn remove(&mut self) {
        self.state = UploadState::Empty;
    }

    pub fn submitted(&mut self) {
        self.state = UploadState::Empty;
    }
}
