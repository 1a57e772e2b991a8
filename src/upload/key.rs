use sha1::{Digest, Sha1};

/// Content-addressed storage key: lowercase hex SHA-1 of the bytes, a period,
/// and the extension of the original file name.
pub fn content_key(bytes: &[u8], file_name: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hex::encode(hasher.finalize());

    format!("{}.{}", digest, file_extension(file_name))
}

/// Text after the last period. A name without a period is used whole.
pub fn file_extension(file_name: &str) -> &str {
    file_name.rsplit('.').next().unwrap_or(file_name)
}

/// Whether a selected file passes the `image/*` filter. When the browser sent
/// no usable content type, the type is guessed from the file name.
pub fn is_accepted_image(content_type: Option<&str>, file_name: &str) -> bool {
    match content_type.map(str::trim).filter(|ct| !ct.is_empty() && *ct != "application/octet-stream") {
        Some(content_type) => content_type.starts_with("image/"),
        None => mime_guess::from_path(file_name)
            .first()
            .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE),
    }
}

/// Content type sent along with the upload.
pub fn upload_content_type(content_type: Option<&str>, file_name: &str) -> String {
    content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .map(String::from)
        .unwrap_or_else(|| {
            mime_guess::from_path(file_name)
                .first_or_octet_stream()
                .to_string()
        })
}
