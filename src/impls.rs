pub mod completers;
pub mod tokener;
pub mod uploaders;
