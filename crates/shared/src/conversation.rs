//! Conversation state machine and metrics bookkeeping
//!
//! Every mutation here is pure: the caller supplies `now` and the SLA policy,
//! persists the result and publishes whatever event the return value implies.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{SupportError, SupportResult};
use crate::sla::SlaPolicy;
use crate::types::{Conversation, ConversationStatus, MessageKind, Priority};

pub const MAX_TAG_LENGTH: usize = 50;
pub const MAX_TAGS: usize = 20;

/// Explicit status changes permitted by the state machine
pub fn is_allowed_transition(from: ConversationStatus, to: ConversationStatus) -> bool {
    use ConversationStatus::*;

    matches!(
        (from, to),
        (Open, Pending | Resolved | Closed)
            | (Pending, Open | Resolved | Closed)
            | (Resolved, Open | Closed)
            | (Closed, Open)
    )
}

impl Conversation {
    /// Staff-driven status change.
    ///
    /// Returns `Ok(false)` when the conversation already has `to`. Leaving a
    /// settled state restarts the resolution deadline from `now`.
    pub fn set_status(
        &mut self,
        to: ConversationStatus,
        now: OffsetDateTime,
        policy: &SlaPolicy,
    ) -> SupportResult<bool> {
        let from = self.status;
        if from == to {
            return Ok(false);
        }
        if !is_allowed_transition(from, to) {
            return Err(SupportError::InvalidTransition { from, to });
        }

        self.status = to;
        self.resolved_at = (to == ConversationStatus::Resolved).then_some(now);
        if from.is_settled() && !to.is_settled() {
            self.resolution_sla_at = Some(policy.resolution_deadline(now));
        }
        self.updated_at = Some(now);
        Ok(true)
    }

    /// Reopen after customer activity on a resolved or closed ticket
    pub fn auto_reopen(&mut self, now: OffsetDateTime, policy: &SlaPolicy) -> bool {
        if !self.status.is_settled() {
            return false;
        }

        self.status = ConversationStatus::Open;
        self.resolved_at = None;
        self.resolution_sla_at = Some(policy.resolution_deadline(now));
        self.updated_at = Some(now);
        true
    }

    pub fn assign(&mut self, agent_id: Option<Uuid>, now: OffsetDateTime) -> bool {
        if self.assigned_to_id == agent_id {
            return false;
        }
        self.assigned_to_id = agent_id;
        self.updated_at = Some(now);
        true
    }

    pub fn set_priority(&mut self, priority: Priority, now: OffsetDateTime) -> bool {
        if self.priority == priority {
            return false;
        }
        self.priority = priority;
        self.updated_at = Some(now);
        true
    }

    pub fn mark_seen(&mut self, by_staff: bool, now: OffsetDateTime) {
        if by_staff {
            self.last_seen_by_staff_at = Some(now);
        } else {
            self.last_seen_by_customer_at = Some(now);
        }
    }

    /// Apply tag additions then removals. Returns whether the set changed.
    pub fn update_tags(
        &mut self,
        add: &[String],
        remove: &[String],
        now: OffsetDateTime,
    ) -> SupportResult<bool> {
        let mut tags = self.tags.clone();

        for tag in add {
            tags.insert(normalize_tag(tag)?);
        }
        for tag in remove {
            tags.remove(tag.trim());
        }

        if tags.len() > MAX_TAGS {
            return Err(SupportError::Validation(format!(
                "A conversation can carry at most {} tags",
                MAX_TAGS
            )));
        }
        if tags == self.tags {
            return Ok(false);
        }

        self.tags = tags;
        self.updated_at = Some(now);
        Ok(true)
    }

    /// Update timeline metrics for a freshly persisted message.
    ///
    /// `first_response_at` is only ever set once, by the first AGENT message.
    pub fn record_message(&mut self, kind: MessageKind, now: OffsetDateTime) {
        match kind {
            MessageKind::Agent | MessageKind::Internal => {
                self.last_agent_message_at = Some(now);
                if kind == MessageKind::Agent && self.first_response_at.is_none() {
                    self.first_response_at = Some(now);
                }
            }
            MessageKind::User => {
                self.last_customer_message_at = Some(now);
            }
            MessageKind::System => {}
        }
        self.last_message_at = Some(now);
        self.updated_at = Some(now);
    }
}

fn normalize_tag(tag: &str) -> SupportResult<String> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(SupportError::Validation("Tags cannot be empty".into()));
    }
    if tag.chars().count() > MAX_TAG_LENGTH {
        return Err(SupportError::Validation(format!(
            "Tag too long (max {} characters)",
            MAX_TAG_LENGTH
        )));
    }
    Ok(tag.to_string())
}
