//! In-process [`Store`] for tests. Enforces the same uniqueness rules as the
//! SQL schema and can be told to fail like an overloaded database.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::core::models::{
    poll::{Insert as PollInsert, Query as PollQuery, RawPoll},
    profile::{Credential, Insert as ProfileInsert, Patch as ProfilePatch, Profile},
    vote::{Insert as VoteInsert, Query as VoteQuery, RawVote},
};
use crate::core::ports::repository::{AccessCommon, PollCommon, ProfileCommon, Store, VoteCommon};
use crate::error::Error;

#[derive(Default)]
struct Tables {
    polls: Vec<RawPoll>,
    votes: Vec<RawVote>,
    access: Vec<(Uuid, Uuid)>,
    profiles: Vec<(Profile, Credential)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    throttled_poll_reads: AtomicU32,
    poll_reads: AtomicUsize,
    profiles_down: AtomicBool,
}

fn contains(field: Option<&str>, needle: &str) -> bool {
    field.map(|f| f.to_lowercase().contains(needle)).unwrap_or(false)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next `n` poll reads fail with [`Error::TooManyRequests`].
    pub fn throttle_poll_reads(&self, n: u32) {
        self.throttled_poll_reads.store(n, Ordering::SeqCst);
    }

    /// Number of poll reads that reached the store, throttled ones included.
    pub fn poll_reads(&self) -> usize {
        self.poll_reads.load(Ordering::SeqCst)
    }

    pub fn set_profiles_down(&self, down: bool) {
        self.profiles_down.store(down, Ordering::SeqCst);
    }

    /// Stores a poll row as-is, bypassing validation.
    pub fn put_raw_poll(&self, poll: RawPoll) {
        self.tables().polls.push(poll);
    }

    pub fn vote_count(&self, poll_id: Uuid) -> usize {
        self.tables().votes.iter().filter(|v| v.poll_id == poll_id).count()
    }

    fn read_poll(&self) -> Result<(), Error> {
        self.poll_reads.fetch_add(1, Ordering::SeqCst);
        let throttled = self.throttled_poll_reads.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if throttled.is_ok() {
            return Err(Error::TooManyRequests);
        }
        Ok(())
    }

    fn read_profile(&self) -> Result<(), Error> {
        if self.profiles_down.load(Ordering::SeqCst) {
            return Err(Error::ServerError("profiles unavailable".into()));
        }
        Ok(())
    }
}

impl PollCommon for MemoryStore {
    async fn insert(&self, poll: PollInsert) -> Result<RawPoll, Error> {
        let row = RawPoll {
            id: Uuid::new_v4(),
            title: poll.title,
            question: Some(poll.question),
            description: Some(poll.description),
            options: Some(poll.options),
            created_at: poll.created_at,
            ends_at: poll.ends_at,
            secret_voting: Some(poll.secret_voting),
            is_active: poll.is_active,
            created_by: poll.created_by,
            image_url: poll.image_url,
            is_private: Some(poll.is_private),
        };
        self.tables().polls.push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<RawPoll>, Error> {
        self.read_poll()?;
        Ok(self.tables().polls.iter().find(|p| p.id == id).cloned())
    }

    async fn query(&self, param: &PollQuery) -> Result<Vec<RawPoll>, Error> {
        self.read_poll()?;
        let needle = param.text_contains.as_ref().map(|t| t.to_lowercase());
        let mut polls: Vec<RawPoll> = self
            .tables()
            .polls
            .iter()
            .rev()
            .filter(|p| param.created_by_eq.map_or(true, |uid| p.created_by == uid))
            .filter(|p| param.is_private_eq.map_or(true, |private| p.is_private.unwrap_or(false) == private))
            .filter(|p| match &needle {
                Some(n) => contains(Some(p.title.as_str()), n) || contains(p.description.as_deref(), n) || contains(p.question.as_deref(), n),
                None => true,
            })
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(polls)
    }

    async fn update_secret_voting(&self, id: Uuid, secret_voting: bool) -> Result<RawPoll, Error> {
        let mut tables = self.tables();
        let poll = tables.polls.iter_mut().find(|p| p.id == id).ok_or_else(|| Error::NotFound("poll".into()))?;
        poll.secret_voting = Some(secret_voting);
        Ok(poll.clone())
    }
}

impl VoteCommon for MemoryStore {
    async fn insert(&self, vote: VoteInsert) -> Result<RawVote, Error> {
        let mut tables = self.tables();
        if tables.votes.iter().any(|v| v.poll_id == vote.poll_id && v.user_id == vote.user_id) {
            return Err(Error::AlreadyVoted);
        }
        let row = RawVote {
            id: Uuid::new_v4(),
            poll_id: vote.poll_id,
            user_id: vote.user_id,
            option_index: vote.option_index,
            created_at: vote.created_at,
        };
        tables.votes.push(row.clone());
        Ok(row)
    }

    async fn query(&self, param: &VoteQuery) -> Result<Vec<RawVote>, Error> {
        Ok(self
            .tables()
            .votes
            .iter()
            .filter(|v| param.poll_id_in.as_ref().map_or(true, |ids| ids.contains(&v.poll_id)))
            .cloned()
            .collect())
    }
}

impl AccessCommon for MemoryStore {
    async fn insert(&self, poll_id: Uuid, user_id: Uuid) -> Result<bool, Error> {
        let mut tables = self.tables();
        if tables.access.contains(&(poll_id, user_id)) {
            return Ok(false);
        }
        tables.access.push((poll_id, user_id));
        Ok(true)
    }

    async fn delete(&self, poll_id: Uuid, user_id: Uuid) -> Result<(), Error> {
        self.tables().access.retain(|grant| *grant != (poll_id, user_id));
        Ok(())
    }

    async fn list(&self, poll_id: Uuid) -> Result<Vec<Uuid>, Error> {
        Ok(self.tables().access.iter().filter(|(p, _)| *p == poll_id).map(|(_, u)| *u).collect())
    }

    async fn is_granted(&self, poll_id: Uuid, user_id: Uuid) -> Result<bool, Error> {
        Ok(self.tables().access.contains(&(poll_id, user_id)))
    }
}

impl ProfileCommon for MemoryStore {
    async fn insert(&self, profile: ProfileInsert) -> Result<Profile, Error> {
        let mut tables = self.tables();
        let taken = tables
            .profiles
            .iter()
            .any(|(p, _)| p.email == profile.email || (profile.username.is_some() && p.username == profile.username));
        if taken {
            return Err(Error::BusinessError("email or username already registered".into()));
        }
        let id = Uuid::new_v4();
        let row = Profile {
            id,
            name: profile.name,
            username: profile.username,
            email: profile.email.clone(),
            avatar_url: None,
            bio: None,
        };
        let cred = Credential {
            id,
            email: profile.email,
            password: profile.password,
            salt: profile.salt,
        };
        tables.profiles.push((row.clone(), cred));
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Profile>, Error> {
        self.read_profile()?;
        Ok(self.tables().profiles.iter().find(|(p, _)| p.id == id).map(|(p, _)| p.clone()))
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Profile>, Error> {
        self.read_profile()?;
        Ok(self.tables().profiles.iter().filter(|(p, _)| ids.contains(&p.id)).map(|(p, _)| p.clone()).collect())
    }

    async fn search(&self, term: &str, limit: i64) -> Result<Vec<Profile>, Error> {
        self.read_profile()?;
        let needle = term.to_lowercase();
        Ok(self
            .tables()
            .profiles
            .iter()
            .map(|(p, _)| p)
            .filter(|p| contains(p.name.as_deref(), &needle) || contains(p.username.as_deref(), &needle) || contains(Some(p.email.as_str()), &needle))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn patch(&self, id: Uuid, patch: ProfilePatch) -> Result<Profile, Error> {
        let mut tables = self.tables();
        let (profile, _) = tables.profiles.iter_mut().find(|(p, _)| p.id == id).ok_or_else(|| Error::NotFound("profile".into()))?;
        if let Some(name) = patch.name {
            profile.name = Some(name);
        }
        if let Some(username) = patch.username {
            profile.username = Some(username);
        }
        if let Some(avatar_url) = patch.avatar_url {
            profile.avatar_url = Some(avatar_url);
        }
        if let Some(bio) = patch.bio {
            profile.bio = Some(bio);
        }
        Ok(profile.clone())
    }

    async fn get_credential(&self, login: &str) -> Result<Option<Credential>, Error> {
        Ok(self
            .tables()
            .profiles
            .iter()
            .find(|(p, _)| p.email == login || p.username.as_deref() == Some(login))
            .map(|(_, c)| c.clone()))
    }
}

impl Store for MemoryStore {}

/// Seeds a profile without going through signup.
pub fn seed_profile(store: &MemoryStore, name: &str, email: &str) -> Profile {
    let id = Uuid::new_v4();
    let profile = Profile {
        id,
        name: Some(name.to_owned()),
        username: Some(name.to_lowercase()),
        email: email.to_owned(),
        avatar_url: Some(format!("https://img.example.com/{}.png", id)),
        bio: None,
    };
    let cred = Credential {
        id,
        email: email.to_owned(),
        password: String::new(),
        salt: String::new(),
    };
    store.tables().profiles.push((profile.clone(), cred));
    profile
}
