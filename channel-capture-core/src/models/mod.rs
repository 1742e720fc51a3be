pub mod capture_summary;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod state;
