pub mod access;
pub mod content;
pub mod poll;
pub mod profile;

use crate::core::models::profile::Caller;
use crate::error::Error;

pub(crate) fn require_caller(caller: Option<&Caller>) -> Result<&Caller, Error> {
    caller.ok_or(Error::Unauthenticated)
}
