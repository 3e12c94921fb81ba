//! Support engine
//!
//! Orchestrates the conversation store, the state machine on
//! [`Conversation`] and the [`EventHub`]. Mutations of one conversation are
//! serialized behind a per-conversation async lock and their events are
//! published while the lock is held, so subscribers see events in the order
//! the mutations were applied.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use helpdesk_shared::query::{self, DEFAULT_PAGE_SIZE};
use helpdesk_shared::{
    classify, Actor, Attachment, Clock, Conversation, ConversationFilter, ConversationStatus,
    ConversationStore, ConversationWithMessages, ListRequest, Message, MessageKind, Page, Priority,
    SlaPolicy, SlaStatus, SortOrder, SupportError, SupportResult, DEFAULT_RISK_WINDOW,
};

use crate::realtime::{EventHub, StreamEvent};

pub const MAX_SUBJECT_LENGTH: usize = 500;
pub const MAX_TEXT_LENGTH: usize = 50_000;
pub const MAX_ATTACHMENTS: usize = 20;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Input for opening a ticket
#[derive(Debug, Clone, Default)]
pub struct NewConversation {
    pub subject: Option<String>,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub channel: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

/// Input for posting into an existing conversation
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub kind: Option<MessageKind>,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filter: ConversationFilter,
    pub sort: SortOrder,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// List row: the conversation plus its current SLA bucket
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub sla: SlaStatus,
}

/// Pick the stored kind for a message.
///
/// `SYSTEM` is never accepted here. Customers always post `USER` messages,
/// whatever they ask for. Staff default to `AGENT` and may not post as the
/// customer.
pub fn resolve_kind(actor: &Actor, requested: Option<MessageKind>) -> SupportResult<MessageKind> {
    match requested {
        Some(MessageKind::System) => Err(SupportError::ReservedKind),
        _ if !actor.is_staff() => {
            if let Some(kind) = requested.filter(|k| *k != MessageKind::User) {
                tracing::debug!(author_id = %actor.id, requested = %kind, "Coercing customer message to USER");
            }
            Ok(MessageKind::User)
        }
        Some(MessageKind::User) => Err(SupportError::ForbiddenKind(MessageKind::User)),
        Some(kind) => Ok(kind),
        None => Ok(MessageKind::Agent),
    }
}

fn validate_content(text: &str, attachments: &[Attachment]) -> SupportResult<()> {
    if text.trim().is_empty() && attachments.is_empty() {
        return Err(SupportError::Validation(
            "Message text cannot be empty without attachments".into(),
        ));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(SupportError::Validation(format!(
            "Message too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    if attachments.len() > MAX_ATTACHMENTS {
        return Err(SupportError::Validation(format!(
            "Too many attachments (max {})",
            MAX_ATTACHMENTS
        )));
    }
    for attachment in attachments {
        if attachment.url.trim().is_empty() || attachment.mime.trim().is_empty() {
            return Err(SupportError::Validation(
                "Attachments need a url and a mime type".into(),
            ));
        }
        if attachment.size < 0 {
            return Err(SupportError::Validation(
                "Attachment size cannot be negative".into(),
            ));
        }
    }
    Ok(())
}

fn normalize_subject(subject: Option<String>) -> SupportResult<Option<String>> {
    let Some(subject) = subject else {
        return Ok(None);
    };
    let subject = subject.trim();
    if subject.chars().count() > MAX_SUBJECT_LENGTH {
        return Err(SupportError::Validation(format!(
            "Subject too long (max {} characters)",
            MAX_SUBJECT_LENGTH
        )));
    }
    Ok((!subject.is_empty()).then(|| subject.to_string()))
}

fn require_staff(actor: &Actor) -> SupportResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(SupportError::Forbidden("Staff role required".into()))
    }
}

pub struct SupportEngine {
    store: Arc<dyn ConversationStore>,
    hub: EventHub,
    clock: Arc<dyn Clock>,
    policy: SlaPolicy,
    risk_window: Duration,
    max_page_size: u32,
    locks: Mutex<HashMap<Uuid, Weak<AsyncMutex<()>>>>,
}

impl SupportEngine {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        hub: EventHub,
        clock: Arc<dyn Clock>,
        policy: SlaPolicy,
    ) -> Self {
        Self {
            store,
            hub,
            clock,
            policy,
            risk_window: DEFAULT_RISK_WINDOW,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_risk_window(mut self, risk_window: Duration) -> Self {
        self.risk_window = risk_window;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn policy(&self) -> &SlaPolicy {
        &self.policy
    }

    /// Wait for exclusive write access to one conversation
    async fn lock_conversation(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            match locks.get(&id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, weak| weak.strong_count() > 0);
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    async fn load(&self, id: Uuid) -> SupportResult<Conversation> {
        self.store
            .get_conversation(id)
            .await?
            .ok_or_else(|| SupportError::NotFound(format!("conversation {}", id)))
    }

    async fn load_accessible(&self, actor: &Actor, id: Uuid) -> SupportResult<Conversation> {
        let conversation = self.load(id).await?;
        if !actor.can_access(&conversation) {
            return Err(SupportError::Forbidden(
                "You do not have access to this conversation".into(),
            ));
        }
        Ok(conversation)
    }

    /// Staff feed and the conversation's own feed
    fn publish(&self, conversation_id: Uuid, event: &StreamEvent) {
        self.hub.publish_to_staff(event);
        self.hub.publish_to_conversation(conversation_id, event);
    }

    /// Open a ticket with its first customer message
    pub async fn create_conversation(
        &self,
        actor: &Actor,
        input: NewConversation,
    ) -> SupportResult<ConversationWithMessages> {
        if actor.is_staff() {
            return Err(SupportError::Forbidden(
                "Conversations are opened by customers".into(),
            ));
        }
        validate_content(&input.text, &input.attachments)?;
        let subject = normalize_subject(input.subject)?;

        let (mut customer_name, mut customer_email) = (input.customer_name, input.customer_email);
        if customer_name.is_none() || customer_email.is_none() {
            if let Some(user) = self.store.find_user(actor.id).await? {
                customer_name = customer_name.or(user.name);
                customer_email = customer_email.or(user.email);
            }
        }

        let now = self.clock.now();
        let mut conversation = Conversation::new(Some(actor.id), now);
        conversation.subject = subject;
        conversation.customer_name = customer_name;
        conversation.customer_email = customer_email;
        if let Some(channel) = input.channel.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            conversation.channel = channel.to_uppercase();
        }
        self.policy.apply_initial_deadlines(&mut conversation);

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            author_id: Some(actor.id),
            kind: MessageKind::User,
            text: input.text,
            created_at: now,
            attachments: input.attachments,
        };
        conversation.record_message(MessageKind::User, now);

        self.store.create_conversation(&conversation, &message).await?;

        tracing::info!(
            conversation_id = %conversation.id,
            user_id = %actor.id,
            "Support conversation created"
        );

        self.hub.publish_to_staff(&StreamEvent::ConversationCreated {
            conversation: conversation.clone(),
        });

        Ok(ConversationWithMessages {
            conversation,
            messages: vec![message],
        })
    }

    /// Conversation with the timeline visible to `actor`
    pub async fn get_conversation(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> SupportResult<ConversationWithMessages> {
        let conversation = self.load_accessible(actor, id).await?;
        let mut messages = self.store.list_messages(id).await?;
        if !actor.is_staff() {
            messages.retain(|m| !m.kind.is_staff_only());
        }
        Ok(ConversationWithMessages {
            conversation,
            messages,
        })
    }

    /// Check that `actor` may follow the conversation's event stream
    pub async fn authorize_subscription(&self, actor: &Actor, id: Uuid) -> SupportResult<()> {
        self.load_accessible(actor, id).await.map(|_| ())
    }

    /// Record a message, update metrics, auto-reopen and fan out.
    ///
    /// Only a failure to persist the message itself is returned. Once the
    /// message is stored, a failed metrics update is logged and the status
    /// event is withheld, but the message is still returned and published.
    pub async fn ingest_message(
        &self,
        actor: &Actor,
        conversation_id: Uuid,
        input: NewMessage,
    ) -> SupportResult<Message> {
        let kind = resolve_kind(actor, input.kind)?;
        validate_content(&input.text, &input.attachments)?;

        let _guard = self.lock_conversation(conversation_id).await;
        let mut conversation = self.load_accessible(actor, conversation_id).await?;
        let now = self.clock.now();

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            author_id: Some(actor.id),
            kind,
            text: input.text,
            created_at: now,
            attachments: input.attachments,
        };
        self.store.insert_message(&message).await?;

        conversation.record_message(kind, now);
        let reopened = kind == MessageKind::User && conversation.auto_reopen(now, &self.policy);

        let metrics_saved = match self.store.update_conversation(&conversation).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    error = %e,
                    "Failed to update conversation metrics after storing message"
                );
                false
            }
        };

        if reopened && metrics_saved {
            tracing::info!(
                conversation_id = %conversation_id,
                resolution_sla_at = ?conversation.resolution_sla_at,
                "Conversation reopened by customer message"
            );
        }

        self.publish(
            conversation_id,
            &StreamEvent::MessageCreated {
                conversation_id,
                message: message.clone(),
            },
        );
        if reopened && metrics_saved {
            self.publish(conversation_id, &StreamEvent::status_changed(&conversation));
        }

        Ok(message)
    }

    /// Staff status change. Re-applying the current status is a no-op.
    pub async fn set_status(
        &self,
        actor: &Actor,
        id: Uuid,
        status: ConversationStatus,
    ) -> SupportResult<Conversation> {
        require_staff(actor)?;

        let _guard = self.lock_conversation(id).await;
        let mut conversation = self.load(id).await?;
        if !conversation.set_status(status, self.clock.now(), &self.policy)? {
            return Ok(conversation);
        }
        self.store.update_conversation(&conversation).await?;

        tracing::info!(
            conversation_id = %id,
            actor_id = %actor.id,
            status = %status,
            "Conversation status changed"
        );
        self.publish(id, &StreamEvent::status_changed(&conversation));
        Ok(conversation)
    }

    /// Assign to a staff member, or unassign with `None`
    pub async fn assign(
        &self,
        actor: &Actor,
        id: Uuid,
        agent_id: Option<Uuid>,
    ) -> SupportResult<Conversation> {
        require_staff(actor)?;

        if let Some(agent_id) = agent_id {
            match self.store.find_user(agent_id).await? {
                None => return Err(SupportError::NotFound(format!("agent {}", agent_id))),
                Some(user) if !user.role.is_staff() => {
                    return Err(SupportError::Validation(
                        "Assignee must be a staff member".into(),
                    ))
                }
                Some(_) => {}
            }
        }

        let _guard = self.lock_conversation(id).await;
        let mut conversation = self.load(id).await?;
        if !conversation.assign(agent_id, self.clock.now()) {
            return Ok(conversation);
        }
        self.store.update_conversation(&conversation).await?;

        tracing::info!(
            conversation_id = %id,
            actor_id = %actor.id,
            assigned_to = ?agent_id,
            "Conversation assignment changed"
        );
        self.publish(
            id,
            &StreamEvent::ConversationAssigned {
                conversation_id: id,
                assigned_to_id: agent_id,
            },
        );
        Ok(conversation)
    }

    pub async fn set_priority(
        &self,
        actor: &Actor,
        id: Uuid,
        priority: Priority,
    ) -> SupportResult<Conversation> {
        require_staff(actor)?;

        let _guard = self.lock_conversation(id).await;
        let mut conversation = self.load(id).await?;
        if !conversation.set_priority(priority, self.clock.now()) {
            return Ok(conversation);
        }
        self.store.update_conversation(&conversation).await?;

        tracing::info!(
            conversation_id = %id,
            actor_id = %actor.id,
            priority = %priority,
            "Conversation priority changed"
        );
        self.publish(
            id,
            &StreamEvent::ConversationPriority {
                conversation_id: id,
                priority,
            },
        );
        Ok(conversation)
    }

    pub async fn update_tags(
        &self,
        actor: &Actor,
        id: Uuid,
        add: &[String],
        remove: &[String],
    ) -> SupportResult<Conversation> {
        require_staff(actor)?;

        let _guard = self.lock_conversation(id).await;
        let mut conversation = self.load(id).await?;
        if !conversation.update_tags(add, remove, self.clock.now())? {
            return Ok(conversation);
        }
        self.store.update_conversation(&conversation).await?;

        tracing::info!(
            conversation_id = %id,
            actor_id = %actor.id,
            tag_count = conversation.tags.len(),
            "Conversation tags updated"
        );
        self.publish(
            id,
            &StreamEvent::ConversationTags {
                conversation_id: id,
                tags: conversation.tags.clone(),
            },
        );
        Ok(conversation)
    }

    /// Stamp the caller's side as having read the conversation
    pub async fn mark_seen(&self, actor: &Actor, id: Uuid) -> SupportResult<Conversation> {
        let _guard = self.lock_conversation(id).await;
        let mut conversation = self.load_accessible(actor, id).await?;
        let now = self.clock.now();
        let by_staff = actor.is_staff();

        conversation.mark_seen(by_staff, now);
        self.store.update_conversation(&conversation).await?;

        self.publish(
            id,
            &StreamEvent::ConversationSeen {
                conversation_id: id,
                by_staff,
                seen_at: now,
            },
        );
        Ok(conversation)
    }

    /// Staff inbox listing
    pub async fn list(
        &self,
        actor: &Actor,
        list: ListQuery,
    ) -> SupportResult<Page<ConversationSummary>> {
        require_staff(actor)?;

        let now = self.clock.now();
        let request = ListRequest {
            filter: list.filter,
            sort: list.sort,
            page: list.page.unwrap_or(1),
            page_size: list.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            caller_id: actor.id,
            now,
            risk_window: self.risk_window,
        };
        let conversations = self.store.list_conversations().await?;
        let page = query::list_conversations(conversations, &request, self.max_page_size);

        let risk_window = self.risk_window;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|conversation| ConversationSummary {
                    sla: classify(&conversation, now, risk_window),
                    conversation,
                })
                .collect(),
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        })
    }
}
