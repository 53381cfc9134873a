pub mod events;
pub mod handshake;
pub mod media;
pub mod vision;

pub use events::{ClientEvent, ServerEvent};
