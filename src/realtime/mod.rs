//! Realtime row-change notifications over the backend websocket

mod client;
mod message;

pub use client::{ChangeFeed, ChangeParams, ConnectionState, RealtimeClient};
pub use message::{ChangeKind, ChannelEvent, PostgresChange, RealtimeMessage};
