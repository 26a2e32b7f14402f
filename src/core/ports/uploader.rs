use crate::core::models::upload_file::UploadedFileCreate;
use crate::error::Error;

/// Blob store for poll images and avatars.
pub trait Uploader {
    /// Stores the file and returns the URL it is publicly served from.
    async fn put(&self, file: UploadedFileCreate) -> Result<String, Error>;
}
