pub mod completer;
pub mod repository;
pub mod tokener;
pub mod uploader;
