use crate::error::Error;

/// Text-completion service.
pub trait Completer {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, Error>;
}
