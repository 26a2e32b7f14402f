use actix_multipart::Multipart;
use actix_web::web::{Data, Json};
use bytes::BytesMut;
use futures_util::TryStreamExt;

use crate::context::UserInfo;
use crate::core::models::upload_file::UploadedFileCreate;
use crate::core::ports::uploader::Uploader;
use crate::error::Error;
use crate::response::Uploaded;

fn extension_of(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => "",
    }
}

/// Stores the first file of the form and returns its public URL.
pub async fn create<U: Uploader + 'static>(user_info: UserInfo, mut payload: Multipart, uploader: Data<U>) -> Result<Json<Uploaded>, Error> {
    while let Some(mut field) = payload.try_next().await? {
        if let Some(mime) = field.content_type() {
            if mime.type_().as_str() != "image" {
                return Err(Error::BusinessError(format!("unsupported file type {}", mime)));
            }
        }
        let name = match field.content_disposition().get_filename() {
            Some(filename) => filename.to_owned(),
            None => continue,
        };
        let mut content = BytesMut::new();
        while let Some(chunk) = field.try_next().await? {
            content.extend_from_slice(&chunk);
        }
        let url = uploader
            .put(UploadedFileCreate {
                extension: extension_of(&name).to_owned(),
                name,
                content: content.to_vec(),
                owner_id: user_info.id,
            })
            .await?;
        return Ok(Json(Uploaded { url }));
    }
    Err(Error::BusinessError("no file in upload".into()))
}
