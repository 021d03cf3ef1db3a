pub mod config_io;
pub mod recovery;
pub mod recurrence;
pub mod repository;
pub mod source;
pub mod watcher;
