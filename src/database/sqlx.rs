use sqlx::{query, query_as, query_scalar, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::core::models::{
    poll::{Insert as PollInsert, Query as PollQuery, RawPoll},
    profile::{Credential, Insert as ProfileInsert, Patch as ProfilePatch, Profile},
    vote::{Insert as VoteInsert, Query as VoteQuery, RawVote},
};
use crate::core::ports::repository::{AccessCommon, PollCommon, ProfileCommon, Store, VoteCommon};
use crate::error::Error;

const UNIQUE_VIOLATION: &str = "23505";
const PROFILE_COLUMNS: &str = "id, name, username, email, avatar_url, bio";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

/// `%term%` for ILIKE, with the pattern metacharacters in `term` escaped.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(Clone)]
pub struct PgSqlx {
    pool: PgPool,
}

impl PgSqlx {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl PollCommon for PgSqlx {
    async fn insert(&self, poll: PollInsert) -> Result<RawPoll, Error> {
        let row = query_as(
            "
        INSERT INTO polls (title, question, description, options, created_at, ends_at, secret_voting, is_active, created_by, image_url, is_private)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *",
        )
        .bind(poll.title)
        .bind(poll.question)
        .bind(poll.description)
        .bind(poll.options)
        .bind(poll.created_at)
        .bind(poll.ends_at)
        .bind(poll.secret_voting)
        .bind(poll.is_active)
        .bind(poll.created_by)
        .bind(poll.image_url)
        .bind(poll.is_private)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<RawPoll>, Error> {
        let poll = query_as("SELECT * FROM polls WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(poll)
    }

    async fn query(&self, param: &PollQuery) -> Result<Vec<RawPoll>, Error> {
        let mut stmt = QueryBuilder::<Postgres>::new("SELECT * FROM polls WHERE 1 = 1");
        if let Some(uid) = param.created_by_eq {
            stmt.push(" AND created_by = ").push_bind(uid);
        }
        if let Some(private) = param.is_private_eq {
            stmt.push(" AND COALESCE(is_private, FALSE) = ").push_bind(private);
        }
        if let Some(term) = &param.text_contains {
            let pattern = contains_pattern(term);
            stmt.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR question ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        stmt.push(" ORDER BY created_at DESC");
        let polls = stmt.build_query_as().fetch_all(&self.pool).await?;
        Ok(polls)
    }

    async fn update_secret_voting(&self, id: Uuid, secret_voting: bool) -> Result<RawPoll, Error> {
        let poll = query_as("UPDATE polls SET secret_voting = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(secret_voting)
            .fetch_optional(&self.pool)
            .await?;
        poll.ok_or_else(|| Error::NotFound("poll".into()))
    }
}

impl VoteCommon for PgSqlx {
    async fn insert(&self, vote: VoteInsert) -> Result<RawVote, Error> {
        query_as("INSERT INTO votes (poll_id, user_id, option_index, created_at) VALUES ($1, $2, $3, $4) RETURNING *")
            .bind(vote.poll_id)
            .bind(vote.user_id)
            .bind(vote.option_index)
            .bind(vote.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| if is_unique_violation(&e) { Error::AlreadyVoted } else { e.into() })
    }

    async fn query(&self, param: &VoteQuery) -> Result<Vec<RawVote>, Error> {
        let mut stmt = QueryBuilder::<Postgres>::new("SELECT * FROM votes WHERE 1 = 1");
        if let Some(ids) = &param.poll_id_in {
            stmt.push(" AND poll_id = ANY(").push_bind(ids.clone()).push(")");
        }
        stmt.push(" ORDER BY created_at");
        let votes = stmt.build_query_as().fetch_all(&self.pool).await?;
        Ok(votes)
    }
}

impl AccessCommon for PgSqlx {
    async fn insert(&self, poll_id: Uuid, user_id: Uuid) -> Result<bool, Error> {
        let res = query("INSERT INTO poll_access (poll_id, user_id) VALUES ($1, $2) ON CONFLICT (poll_id, user_id) DO NOTHING")
            .bind(poll_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(&self, poll_id: Uuid, user_id: Uuid) -> Result<(), Error> {
        query("DELETE FROM poll_access WHERE poll_id = $1 AND user_id = $2")
            .bind(poll_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, poll_id: Uuid) -> Result<Vec<Uuid>, Error> {
        let ids = query_scalar("SELECT user_id FROM poll_access WHERE poll_id = $1 ORDER BY created_at")
            .bind(poll_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn is_granted(&self, poll_id: Uuid, user_id: Uuid) -> Result<bool, Error> {
        let granted = query_scalar("SELECT EXISTS(SELECT 1 FROM poll_access WHERE poll_id = $1 AND user_id = $2)")
            .bind(poll_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(granted)
    }
}

impl ProfileCommon for PgSqlx {
    async fn insert(&self, profile: ProfileInsert) -> Result<Profile, Error> {
        query_as(&format!(
            "INSERT INTO profiles (name, username, email, password, salt) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(profile.name)
        .bind(profile.username)
        .bind(profile.email)
        .bind(profile.password)
        .bind(profile.salt)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::BusinessError("email or username already registered".into())
            } else {
                e.into()
            }
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<Profile>, Error> {
        let profile = query_as(&format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Profile>, Error> {
        let profiles = query_as(&format!("SELECT {} FROM profiles WHERE id = ANY($1)", PROFILE_COLUMNS))
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(profiles)
    }

    async fn search(&self, term: &str, limit: i64) -> Result<Vec<Profile>, Error> {
        let profiles = query_as(&format!(
            "
        SELECT {}
        FROM profiles
        WHERE name ILIKE $1 OR username ILIKE $1 OR email ILIKE $1
        ORDER BY name NULLS LAST, email
        LIMIT $2",
            PROFILE_COLUMNS
        ))
        .bind(contains_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn patch(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, Error> {
        let profile = query_as(&format!(
            "
        UPDATE profiles SET
            name = COALESCE($2, name),
            username = COALESCE($3, username),
            avatar_url = COALESCE($4, avatar_url),
            bio = COALESCE($5, bio),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.username)
        .bind(patch.avatar_url)
        .bind(patch.bio)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::BusinessError("username already taken".into())
            } else {
                e.into()
            }
        })?;
        profile.ok_or_else(|| Error::NotFound("profile".into()))
    }

    async fn get_credential(&self, login: &str) -> Result<Option<Credential>, Error> {
        let cred = query_as("SELECT id, email, password, salt FROM profiles WHERE username = $1 OR email = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cred)
    }
}

impl Store for PgSqlx {}
