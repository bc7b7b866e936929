pub mod error;
pub mod health;
pub mod integration;
pub mod pagination;
pub mod sync_log;
