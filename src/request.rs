use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Search {
    #[serde(default)]
    pub q: String,
}
