use serde::{Deserialize, Serialize};

use crate::core::models::poll::PollOption;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedPollContent {
    pub question: String,
    pub description: String,
    pub options: Vec<PollOption>,
}

impl GeneratedPollContent {
    /// What the create form starts from when nothing could be generated.
    pub fn fallback(title: &str) -> Self {
        Self {
            question: title.to_owned(),
            description: String::new(),
            options: vec![PollOption::new(""), PollOption::new("")],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub title: String,
}
