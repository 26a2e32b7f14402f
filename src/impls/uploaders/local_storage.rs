use std::fs::{create_dir_all, write};
use std::path::{Path, PathBuf};

use log::info;
use uuid::Uuid;

use crate::core::models::upload_file::UploadedFileCreate;
use crate::core::ports::uploader::Uploader;
use crate::error::Error;

/// Route prefix the upload directory is served under.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Writes uploads to a directory that is served statically.
pub struct LocalStorage {
    path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>, base_url: &str) -> Result<Self, Error> {
        let path = path.into();
        create_dir_all(&path)?;
        Ok(Self {
            path,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn clean_extension(ext: &str) -> String {
    let ext: String = ext.chars().filter(char::is_ascii_alphanumeric).take(8).collect::<String>().to_lowercase();
    if ext.is_empty() {
        "bin".into()
    } else {
        ext
    }
}

impl Uploader for LocalStorage {
    async fn put(&self, file: UploadedFileCreate) -> Result<String, Error> {
        let filename = format!("{}.{}", Uuid::new_v4(), clean_extension(&file.extension));
        write(self.path.join(&filename), &file.content)?;
        info!("stored {} ({} bytes) for {} as {}", file.name, file.content.len(), file.owner_id, filename);
        Ok(format!("{}{}/{}", self.base_url, PUBLIC_PREFIX, filename))
    }
}
