use hex::ToHex;
use log::error;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::models::profile::{Caller, Insert as ProfileInsert, Login, Patch, Profile, Signup};
use crate::core::ports::repository::{ProfileCommon, Store};
use crate::core::services::require_caller;
use crate::error::Error;

pub const USER_SEARCH_LIMIT: i64 = 10;
const SALT_LENGTH: usize = 32;

fn hash_password(pass: &str, slt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pass);
    hasher.update(slt);
    hasher.finalize().encode_hex()
}

fn random_salt() -> String {
    thread_rng().sample_iter(&Alphanumeric).take(SALT_LENGTH).map(char::from).collect()
}

/// Anonymous callers are rejected; lookup failures yield no users.
pub async fn search_users<S: Store>(store: &S, caller: Option<&Caller>, query: &str) -> Result<Vec<Profile>, Error> {
    require_caller(caller)?;
    let term = query.trim();
    if term.is_empty() {
        return Ok(Vec::new());
    }
    Ok(ProfileCommon::search(store, term, USER_SEARCH_LIMIT).await.unwrap_or_else(|e| {
        error!("searchUsers failed, returning no users: {}", e);
        Vec::new()
    }))
}

pub async fn get_profile<S: Store>(store: &S, id: Uuid) -> Result<Profile, Error> {
    ProfileCommon::get(store, id).await?.ok_or_else(|| Error::NotFound("profile".into()))
}

pub async fn update_profile<S: Store>(store: &S, caller: Option<&Caller>, patch: Patch) -> Result<Profile, Error> {
    let caller = require_caller(caller)?;
    ProfileCommon::patch(store, caller.id, patch).await
}

pub async fn signup<S: Store>(store: &S, Signup { name, username, email, password }: Signup) -> Result<Profile, Error> {
    let email = email.trim().to_owned();
    if !email.contains('@') {
        return Err(Error::BusinessError("invalid email address".into()));
    }
    if password.is_empty() {
        return Err(Error::BusinessError("password must not be empty".into()));
    }
    let salt = random_salt();
    ProfileCommon::insert(
        store,
        ProfileInsert {
            name,
            username,
            email,
            password: hash_password(&password, &salt),
            salt,
        },
    )
    .await
}

pub async fn authenticate<S: Store>(store: &S, Login { username, password }: Login) -> Result<Caller, Error> {
    match ProfileCommon::get_credential(store, username.trim()).await? {
        Some(cred) if hash_password(&password, &cred.salt) == cred.password => Ok(Caller { id: cred.id, email: cred.email }),
        _ => Err(Error::BusinessError("invalid username or password".into())),
    }
}
