pub mod access;
pub mod content;
pub mod poll;
pub mod profile;
pub mod upload_file;
pub mod vote;
