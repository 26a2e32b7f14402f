use actix_web::web::{Data, Json};

use crate::context::UserInfo;
use crate::core::models::content::{GenerateRequest, GeneratedPollContent};
use crate::core::ports::completer::Completer;
use crate::core::services::content::generate_poll_content;
use crate::error::Error;

/// `completer` is `None` when no completion service is configured.
pub async fn generate<C: Completer + 'static>(
    _: UserInfo,
    Json(GenerateRequest { title }): Json<GenerateRequest>,
    completer: Data<Option<C>>,
) -> Result<Json<GeneratedPollContent>, Error> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::BusinessError("a title is required to generate content".into()));
    }
    Ok(Json(generate_poll_content(completer.get_ref().as_ref(), title).await))
}
