//! Helpdesk Shared Types and Utilities
//!
//! Domain model and persistence for the support engine: business-hours
//! arithmetic, SLA tracking, the conversation state machine, the staff
//! list query and the conversation store.

pub mod business_hours;
pub mod clock;
pub mod conversation;
pub mod db;
pub mod error;
pub mod query;
pub mod sla;
pub mod store;
pub mod types;

pub use business_hours::{BusinessHours, BusinessHoursError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use db::{create_pool, run_migrations, PgConversationStore};
pub use error::{SupportError, SupportResult};
pub use query::{ConversationFilter, ListRequest, Mailbox, Page, SortOrder};
pub use sla::{classify, SlaPolicy, SlaStatus, DEFAULT_RISK_WINDOW};
pub use store::{ConversationStore, InMemoryConversationStore};
pub use types::*;
