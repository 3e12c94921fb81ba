//! Persistence abstraction for conversations and messages
//!
//! The engine only relies on the named operations below. Row layout and
//! transactions belong to the implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{SupportError, SupportResult};
use crate::types::{Conversation, Message, UserRecord};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation together with its opening message
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first_message: &Message,
    ) -> SupportResult<()>;

    async fn get_conversation(&self, id: Uuid) -> SupportResult<Option<Conversation>>;

    /// Overwrite the mutable fields of an existing conversation
    async fn update_conversation(&self, conversation: &Conversation) -> SupportResult<()>;

    /// Persist a message and all of its attachments atomically
    async fn insert_message(&self, message: &Message) -> SupportResult<()>;

    /// Timeline ordered by `created_at`, insertion order breaking ties
    async fn list_messages(&self, conversation_id: Uuid) -> SupportResult<Vec<Message>>;

    async fn list_conversations(&self) -> SupportResult<Vec<Conversation>>;

    async fn find_user(&self, id: Uuid) -> SupportResult<Option<UserRecord>>;

    /// Cheap liveness check used by health probes
    async fn ping(&self) -> SupportResult<()>;
}

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Vec<Message>>,
    users: HashMap<Uuid, UserRecord>,
}

/// In-memory store for development and tests
#[derive(Default)]
pub struct InMemoryConversationStore {
    state: RwLock<MemoryState>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user in the directory
    pub async fn insert_user(&self, user: UserRecord) {
        self.state.write().await.users.insert(user.id, user);
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first_message: &Message,
    ) -> SupportResult<()> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id) {
            return Err(SupportError::Persistence(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        state
            .messages
            .insert(conversation.id, vec![first_message.clone()]);
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> SupportResult<Option<Conversation>> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn update_conversation(&self, conversation: &Conversation) -> SupportResult<()> {
        let mut state = self.state.write().await;
        match state.conversations.get_mut(&conversation.id) {
            Some(existing) => {
                *existing = conversation.clone();
                Ok(())
            }
            None => Err(SupportError::NotFound(format!(
                "conversation {}",
                conversation.id
            ))),
        }
    }

    async fn insert_message(&self, message: &Message) -> SupportResult<()> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(SupportError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }
        let timeline = state.messages.entry(message.conversation_id).or_default();
        // Insert after every message with created_at <= ours to keep ties in arrival order
        let position = timeline.partition_point(|m| m.created_at <= message.created_at);
        timeline.insert(position, message.clone());
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> SupportResult<Vec<Message>> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_conversations(&self) -> SupportResult<Vec<Conversation>> {
        Ok(self
            .state
            .read()
            .await
            .conversations
            .values()
            .cloned()
            .collect())
    }

    async fn find_user(&self, id: Uuid) -> SupportResult<Option<UserRecord>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn ping(&self) -> SupportResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKind, Role};
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn message(conversation_id: Uuid, text: &str, created_at: OffsetDateTime) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            author_id: None,
            kind: MessageKind::User,
            text: text.to_string(),
            created_at,
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let store = InMemoryConversationStore::new();
        let conv = Conversation::new(None, datetime!(2024-01-01 10:00 UTC));
        let first = message(conv.id, "hello", conv.created_at);

        store.create_conversation(&conv, &first).await.unwrap();

        assert_eq!(store.get_conversation(conv.id).await.unwrap(), Some(conv.clone()));
        assert_eq!(store.list_messages(conv.id).await.unwrap(), vec![first]);
        assert!(store.create_conversation(&conv, &message(conv.id, "x", conv.created_at)).await.is_err());
    }

    #[tokio::test]
    async fn test_messages_keep_insertion_order_on_ties() {
        let store = InMemoryConversationStore::new();
        let at = datetime!(2024-01-01 10:00 UTC);
        let conv = Conversation::new(None, at);
        let first = message(conv.id, "first", at);
        store.create_conversation(&conv, &first).await.unwrap();

        let later = message(conv.id, "later", at + time::Duration::minutes(5));
        let tie_a = message(conv.id, "tie-a", at);
        let tie_b = message(conv.id, "tie-b", at);
        store.insert_message(&later).await.unwrap();
        store.insert_message(&tie_a).await.unwrap();
        store.insert_message(&tie_b).await.unwrap();

        let texts: Vec<_> = store
            .list_messages(conv.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["first", "tie-a", "tie-b", "later"]);
    }

    #[tokio::test]
    async fn test_insert_message_requires_conversation() {
        let store = InMemoryConversationStore::new();
        let orphan = message(Uuid::new_v4(), "lost", datetime!(2024-01-01 10:00 UTC));
        assert!(matches!(
            store.insert_message(&orphan).await,
            Err(SupportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_user_directory() {
        let store = InMemoryConversationStore::new();
        let user = UserRecord {
            id: Uuid::new_v4(),
            name: Some("Agent Smith".into()),
            email: None,
            role: Role::Support,
        };
        store.insert_user(user.clone()).await;

        assert_eq!(store.find_user(user.id).await.unwrap(), Some(user));
        assert_eq!(store.find_user(Uuid::new_v4()).await.unwrap(), None);
    }
}
