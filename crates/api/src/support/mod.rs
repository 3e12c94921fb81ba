//! Ticket lifecycle orchestration

pub mod engine;

pub use engine::{
    resolve_kind, ConversationSummary, ListQuery, NewConversation, NewMessage, SupportEngine,
};
