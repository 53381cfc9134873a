pub mod app;
pub mod auth;
pub mod chat;
pub mod dispatch;
pub mod handshake;
pub mod http;
pub mod session;
pub mod sinks;
pub mod ws;
