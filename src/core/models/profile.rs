use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The signed-in identity carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub email: String,
}

impl Caller {
    /// Display name used when no profile name is available.
    pub fn fallback_name(&self) -> String {
        match self.email.split('@').next() {
            Some(local) if !local.is_empty() => local.to_owned(),
            _ => "User".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// Best-effort display fields for a poll's creator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Creator {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<&Profile> for Creator {
    fn from(p: &Profile) -> Self {
        Self {
            name: p.name.clone(),
            avatar_url: p.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub email: String,
    pub password: String,
    pub salt: String,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: String,
    pub password: String,
    pub salt: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Signup {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}
