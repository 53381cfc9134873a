pub mod manager;
pub mod player;
pub mod resolver;
pub mod stream;

pub use manager::MediaManager;
pub use player::Player;
pub use resolver::{HttpTrackResolver, ResolveError, TrackResolver};
pub use stream::StreamSink;
