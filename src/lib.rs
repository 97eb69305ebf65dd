pub mod config;
pub mod directory;
pub mod entries;
pub mod error;
pub mod identity;
pub mod server;
pub mod storage;
pub mod template;
