pub mod amputate;
pub mod cache;
pub mod config;
pub mod correlate;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod persist;
pub mod reply;
pub mod resolver;
pub mod servers;
pub mod stats;

/// Shared state handed to every event
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub amputator: amputate::Amputator,
    /// Bot's own user ID, used to spot outgoing messages
    pub bot_id: u64,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
