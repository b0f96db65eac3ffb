pub mod config;
pub mod room_sync;
pub mod session;
pub mod stats;
