use log::warn;
use serde::Deserialize;
use serde_json::Value;

use crate::core::models::content::GeneratedPollContent;
use crate::core::models::poll::PollOption;
use crate::core::ports::completer::Completer;
use crate::error::Error;

const SYSTEM_PROMPT: &str = "You write engaging, neutral poll content and answer with JSON only.";

fn prompt(title: &str) -> String {
    format!(
        r#"Generate content for a poll with the title: "{}".

The response should be in JSON format with the following structure:
{{
  "question": "A clear question based on the title",
  "description": "A brief description providing context for the poll (2-3 sentences)",
  "options": ["Option 1", "Option 2", "Option 3", "Option 4"]
}}

Make sure the question is engaging and clear.
The description should provide context but be concise.
Generate 4-6 realistic options that people would choose between.
If the title suggests a specific type of poll (e.g., preference, opinion, decision), tailor the options accordingly.

Return ONLY the JSON object, nothing else."#,
        title
    )
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    options: Option<Value>,
}

/// Everything from the first `{` to the last `}`, or the whole text.
fn json_block(text: &str) -> &str {
    let text = text.trim();
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn parse_completion(title: &str, text: &str) -> Result<GeneratedPollContent, Error> {
    let completion: Completion = serde_json::from_str(json_block(text))?;
    let options: Vec<PollOption> = match completion.options {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(PollOption::new(s)),
                Value::Object(fields) => fields.get("text").and_then(Value::as_str).map(PollOption::new),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    let fallback = GeneratedPollContent::fallback(title);
    Ok(GeneratedPollContent {
        question: completion.question.filter(|q| !q.is_empty()).unwrap_or(fallback.question),
        description: completion.description.unwrap_or_default(),
        options: if options.is_empty() { fallback.options } else { options },
    })
}

/// Never fails: without a completer, or on any error, the local fallback
/// is returned.
pub async fn generate_poll_content<C: Completer>(completer: Option<&C>, title: &str) -> GeneratedPollContent {
    let Some(completer) = completer else {
        return GeneratedPollContent::fallback(title);
    };
    let generated = match completer.complete(SYSTEM_PROMPT, &prompt(title)).await {
        Ok(text) => parse_completion(title, &text),
        Err(e) => Err(e),
    };
    generated.unwrap_or_else(|e| {
        warn!("poll content generation failed, using fallback: {}", e);
        GeneratedPollContent::fallback(title)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    struct Canned(Result<&'static str, ()>);

    impl Completer for Canned {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, Error> {
            assert!(prompt.contains("Lunch spot"));
            self.0.map(str::to_owned).map_err(|_| Error::TooManyRequests)
        }
    }

    #[tokio::test]
    async fn test_extracts_json_from_chatter() {
        let completer = Canned(Ok("Sure! {\"question\": \"Where?\", \"description\": \"Friday\", \"options\": [\"Tacos\", \"Ramen\", \"Salad\"]} Enjoy"));
        let content = generate_poll_content(Some(&completer), "Lunch spot").await;
        assert_eq!(content.question, "Where?");
        assert_eq!(content.description, "Friday");
        assert_eq!(content.options, vec![PollOption::new("Tacos"), PollOption::new("Ramen"), PollOption::new("Salad")]);
    }

    #[tokio::test]
    async fn test_missing_fields_fall_back_per_field() {
        let completer = Canned(Ok("{\"options\": []}"));
        let content = generate_poll_content(Some(&completer), "Lunch spot").await;
        assert_eq!(content, GeneratedPollContent::fallback("Lunch spot"));
    }

    #[tokio::test]
    async fn test_failures_fall_back() {
        let garbage = Canned(Ok("no json here"));
        assert_eq!(generate_poll_content(Some(&garbage), "Lunch spot").await, GeneratedPollContent::fallback("Lunch spot"));
        let down = Canned(Err(()));
        assert_eq!(generate_poll_content(Some(&down), "Lunch spot").await, GeneratedPollContent::fallback("Lunch spot"));
        assert_eq!(generate_poll_content::<Canned>(None, "Lunch spot").await, GeneratedPollContent::fallback("Lunch spot"));
    }
}
