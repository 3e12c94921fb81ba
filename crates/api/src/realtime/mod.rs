//! Real-time event fanout
//!
//! - **Events**: the frames pushed to subscribers
//! - **Sink**: per-subscriber delivery endpoint
//! - **Hub**: staff feed plus one room per conversation
//! - **Handler**: NDJSON streaming endpoints

pub mod events;
pub mod handler;
pub mod hub;
pub mod sink;

pub use events::StreamEvent;
pub use handler::{conversation_stream, staff_stream};
pub use hub::{Audience, EventHub, HubStats, PublishReport, Scope, Subscription};
pub use sink::{ChannelSink, EventSink, SinkError};
