pub mod handler;
pub mod messages;

pub use handler::{broadcast_snapshot, handle_websocket, notify_session_ended};
