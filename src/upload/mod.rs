pub mod key;
pub mod widget;

pub use key::{content_key, is_accepted_image};
pub use widget::{UploadState, UploadWidget};

use bytes::Bytes;

/// A file chosen in the upload widget.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}
