pub mod config;
pub mod identity;
pub mod notifications;
pub mod push;
pub mod realtime;
