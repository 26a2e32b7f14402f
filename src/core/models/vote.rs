use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A vote row as the store returns it.
#[derive(Debug, Clone, FromRow)]
pub struct RawVote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub user_id: Uuid,
    pub option_index: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub user_id: Uuid,
    pub option_index: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub poll_id: Uuid,
    pub user_id: Uuid,
    pub option_index: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct Query {
    pub poll_id_in: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submit {
    pub option_index: i32,
}
