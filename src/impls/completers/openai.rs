use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::core::ports::completer::Completer;
use crate::error::Error;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 500;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAi {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAi {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self { client, api_key, model }
    }

    fn request<'a>(&'a self, system: &'a str, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [Message { role: "system", content: system }, Message { role: "user", content: prompt }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }
}

impl Completer for OpenAi {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, Error> {
        let resp = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request(system, prompt))
            .send()
            .await?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::TooManyRequests);
        }
        let body: ChatResponse = resp.error_for_status()?.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::ServerError("completion returned no text".into()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let ai = OpenAi::new(Client::new(), "key".into(), "gpt-4o".into());
        let body = serde_json::to_value(ai.request("be brief", "Lunch spot")).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "Lunch spot"}));
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_response_parsing() {
        let body: ChatResponse = serde_json::from_value(json!({"choices": [{"message": {"role": "assistant", "content": "{}"}}]})).unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some("{}"));
    }
}
