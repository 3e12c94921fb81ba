//! Database utilities and the PostgreSQL conversation store

use std::collections::HashMap;
use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{SupportError, SupportResult};
use crate::store::ConversationStore;
use crate::types::{Attachment, Conversation, Message, UserRecord};

/// Create a database connection pool
/// Note: Disables statement cache for PgBouncer compatibility
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    // PgBouncer in transaction mode doesn't support prepared statements
    let options = PgConnectOptions::from_str(database_url)?.statement_cache_capacity(0);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(60))
        .max_lifetime(Duration::from_secs(300))
        .connect_with(options)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

// =============================================================================
// Row Types
// =============================================================================

const CONVERSATION_COLUMNS: &str = r#"
    id, subject, status, priority, channel, user_id, customer_name, customer_email,
    assigned_to_id, created_at, updated_at, last_message_at, last_customer_message_at,
    last_agent_message_at, first_response_at, resolved_at, last_seen_by_customer_at,
    last_seen_by_staff_at, first_response_sla_at, resolution_sla_at, tags
"#;

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    subject: Option<String>,
    status: String,
    priority: String,
    channel: String,
    user_id: Option<Uuid>,
    customer_name: Option<String>,
    customer_email: Option<String>,
    assigned_to_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: Option<OffsetDateTime>,
    last_message_at: Option<OffsetDateTime>,
    last_customer_message_at: Option<OffsetDateTime>,
    last_agent_message_at: Option<OffsetDateTime>,
    first_response_at: Option<OffsetDateTime>,
    resolved_at: Option<OffsetDateTime>,
    last_seen_by_customer_at: Option<OffsetDateTime>,
    last_seen_by_staff_at: Option<OffsetDateTime>,
    first_response_sla_at: Option<OffsetDateTime>,
    resolution_sla_at: Option<OffsetDateTime>,
    tags: Vec<String>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = SupportError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: row.id,
            subject: row.subject,
            status: row.status.parse().map_err(SupportError::Persistence)?,
            priority: row.priority.parse().map_err(SupportError::Persistence)?,
            channel: row.channel,
            user_id: row.user_id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            assigned_to_id: row.assigned_to_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_message_at: row.last_message_at,
            last_customer_message_at: row.last_customer_message_at,
            last_agent_message_at: row.last_agent_message_at,
            first_response_at: row.first_response_at,
            resolved_at: row.resolved_at,
            last_seen_by_customer_at: row.last_seen_by_customer_at,
            last_seen_by_staff_at: row.last_seen_by_staff_at,
            first_response_sla_at: row.first_response_sla_at,
            resolution_sla_at: row.resolution_sla_at,
            tags: row.tags.into_iter().collect(),
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    author_id: Option<Uuid>,
    kind: String,
    text: String,
    created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct AttachmentRow {
    message_id: Uuid,
    url: String,
    mime: String,
    size: i64,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: Option<String>,
    email: Option<String>,
    role: String,
}

// =============================================================================
// Store
// =============================================================================

/// Conversation store backed by PostgreSQL
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Write a message and its attachments on an open connection or transaction
async fn write_message(conn: &mut PgConnection, message: &Message) -> SupportResult<()> {
    sqlx::query(
        r#"
        INSERT INTO support_messages (id, conversation_id, author_id, kind, text, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(message.id)
    .bind(message.conversation_id)
    .bind(message.author_id)
    .bind(message.kind.as_str())
    .bind(&message.text)
    .bind(message.created_at)
    .execute(&mut *conn)
    .await?;

    for (position, attachment) in message.attachments.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO support_attachments (message_id, position, url, mime, size)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id)
        .bind(position as i32)
        .bind(&attachment.url)
        .bind(&attachment.mime)
        .bind(attachment.size)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
        first_message: &Message,
    ) -> SupportResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO support_conversations (
                id, subject, status, priority, channel, user_id, customer_name, customer_email,
                assigned_to_id, created_at, updated_at, last_message_at, last_customer_message_at,
                last_agent_message_at, first_response_at, resolved_at, last_seen_by_customer_at,
                last_seen_by_staff_at, first_response_sla_at, resolution_sla_at, tags
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21)
            "#,
        )
        .bind(conversation.id)
        .bind(&conversation.subject)
        .bind(conversation.status.as_str())
        .bind(conversation.priority.as_str())
        .bind(&conversation.channel)
        .bind(conversation.user_id)
        .bind(&conversation.customer_name)
        .bind(&conversation.customer_email)
        .bind(conversation.assigned_to_id)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .bind(conversation.last_message_at)
        .bind(conversation.last_customer_message_at)
        .bind(conversation.last_agent_message_at)
        .bind(conversation.first_response_at)
        .bind(conversation.resolved_at)
        .bind(conversation.last_seen_by_customer_at)
        .bind(conversation.last_seen_by_staff_at)
        .bind(conversation.first_response_sla_at)
        .bind(conversation.resolution_sla_at)
        .bind(conversation.tags.iter().cloned().collect::<Vec<_>>())
        .execute(&mut *tx)
        .await?;

        write_message(&mut *tx, first_message).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> SupportResult<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM support_conversations WHERE id = $1",
            CONVERSATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Conversation::try_from).transpose()
    }

    async fn update_conversation(&self, conversation: &Conversation) -> SupportResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE support_conversations SET
                subject = $2,
                status = $3,
                priority = $4,
                assigned_to_id = $5,
                updated_at = $6,
                last_message_at = $7,
                last_customer_message_at = $8,
                last_agent_message_at = $9,
                first_response_at = $10,
                resolved_at = $11,
                last_seen_by_customer_at = $12,
                last_seen_by_staff_at = $13,
                first_response_sla_at = $14,
                resolution_sla_at = $15,
                tags = $16
            WHERE id = $1
            "#,
        )
        .bind(conversation.id)
        .bind(&conversation.subject)
        .bind(conversation.status.as_str())
        .bind(conversation.priority.as_str())
        .bind(conversation.assigned_to_id)
        .bind(conversation.updated_at)
        .bind(conversation.last_message_at)
        .bind(conversation.last_customer_message_at)
        .bind(conversation.last_agent_message_at)
        .bind(conversation.first_response_at)
        .bind(conversation.resolved_at)
        .bind(conversation.last_seen_by_customer_at)
        .bind(conversation.last_seen_by_staff_at)
        .bind(conversation.first_response_sla_at)
        .bind(conversation.resolution_sla_at)
        .bind(conversation.tags.iter().cloned().collect::<Vec<_>>())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SupportError::NotFound(format!(
                "conversation {}",
                conversation.id
            )));
        }
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> SupportResult<()> {
        let mut tx = self.pool.begin().await?;
        write_message(&mut *tx, message).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> SupportResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, author_id, kind, text, created_at
            FROM support_messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let attachment_rows: Vec<AttachmentRow> = sqlx::query_as(
            r#"
            SELECT message_id, url, mime, size
            FROM support_attachments
            WHERE message_id = ANY($1)
            ORDER BY message_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut attachments: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
        for row in attachment_rows {
            attachments.entry(row.message_id).or_default().push(Attachment {
                url: row.url,
                mime: row.mime,
                size: row.size,
            });
        }

        rows.into_iter()
            .map(|row| -> SupportResult<Message> {
                Ok(Message {
                    attachments: attachments.remove(&row.id).unwrap_or_default(),
                    id: row.id,
                    conversation_id: row.conversation_id,
                    author_id: row.author_id,
                    kind: row.kind.parse().map_err(SupportError::Persistence)?,
                    text: row.text,
                    created_at: row.created_at,
                })
            })
            .collect()
    }

    async fn list_conversations(&self) -> SupportResult<Vec<Conversation>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM support_conversations",
            CONVERSATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Conversation::try_from).collect()
    }

    async fn find_user(&self, id: Uuid) -> SupportResult<Option<UserRecord>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, email, role FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|row| -> SupportResult<UserRecord> {
            Ok(UserRecord {
                id: row.id,
                name: row.name,
                email: row.email,
                role: row.role.parse().map_err(SupportError::Persistence)?,
            })
        })
        .transpose()
    }

    async fn ping(&self) -> SupportResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;

    async fn test_store() -> PgConversationStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to migrate");
        PgConversationStore::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_round_trip_with_attachments() {
        let store = test_store().await;
        let now = OffsetDateTime::now_utc();
        let mut conv = Conversation::new(None, now);
        conv.tags.insert("billing".into());
        let first = Message {
            id: Uuid::new_v4(),
            conversation_id: conv.id,
            author_id: None,
            kind: MessageKind::User,
            text: String::new(),
            created_at: now,
            attachments: vec![Attachment {
                url: "https://files.example/receipt.pdf".into(),
                mime: "application/pdf".into(),
                size: 2048,
            }],
        };

        store.create_conversation(&conv, &first).await.unwrap();

        let loaded = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.tags, conv.tags);
        let messages = store.list_messages(conv.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].attachments, first.attachments);
    }
}
