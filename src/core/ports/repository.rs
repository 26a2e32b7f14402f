use uuid::Uuid;

use crate::core::models::{
    poll::{Insert as PollInsert, Query as PollQuery, RawPoll},
    profile::{Credential, Insert as ProfileInsert, Patch as ProfilePatch, Profile},
    vote::{Insert as VoteInsert, Query as VoteQuery, RawVote},
};
use crate::error::Error;

pub trait PollCommon {
    async fn insert(&self, poll: PollInsert) -> Result<RawPoll, Error>;
    async fn get(&self, id: Uuid) -> Result<Option<RawPoll>, Error>;
    /// Newest first.
    async fn query(&self, query: &PollQuery) -> Result<Vec<RawPoll>, Error>;
    async fn update_secret_voting(&self, id: Uuid, secret_voting: bool) -> Result<RawPoll, Error>;
}

pub trait VoteCommon {
    /// Fails with [`Error::AlreadyVoted`] when the user already voted on the poll.
    async fn insert(&self, vote: VoteInsert) -> Result<RawVote, Error>;
    async fn query(&self, query: &VoteQuery) -> Result<Vec<RawVote>, Error>;
}

pub trait AccessCommon {
    /// Returns `false` when the grant already existed.
    async fn insert(&self, poll_id: Uuid, user_id: Uuid) -> Result<bool, Error>;
    async fn delete(&self, poll_id: Uuid, user_id: Uuid) -> Result<(), Error>;
    async fn list(&self, poll_id: Uuid) -> Result<Vec<Uuid>, Error>;
    async fn is_granted(&self, poll_id: Uuid, user_id: Uuid) -> Result<bool, Error>;
}

pub trait ProfileCommon {
    async fn insert(&self, profile: ProfileInsert) -> Result<Profile, Error>;
    async fn get(&self, id: Uuid) -> Result<Option<Profile>, Error>;
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Profile>, Error>;
    /// Case-insensitive substring match on name, username and email.
    async fn search(&self, term: &str, limit: i64) -> Result<Vec<Profile>, Error>;
    async fn patch(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, Error>;
    /// Looks a login up by username or email.
    async fn get_credential(&self, login: &str) -> Result<Option<Credential>, Error>;
}

pub trait Store: PollCommon + VoteCommon + AccessCommon + ProfileCommon {}
