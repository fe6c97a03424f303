//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `parley-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reads on the reader
//! pool and every write (or multi-statement unit of work) on the writer.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use uuid::Uuid;

use parley_core::repository::{ChatRepository, MessageFilter};
use parley_types::chat::{ChatMessage, Conversation, Feedback, MessageRole, MessageStatus, StopReason};
use parley_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ConversationRow {
    id: String,
    title: Option<String>,
    model_id: Option<String>,
    system_prompt: Option<String>,
    message_count: i64,
    tokens_used: i64,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            model_id: row.try_get("model_id")?,
            system_prompt: row.try_get("system_prompt")?,
            message_count: row.try_get("message_count")?,
            tokens_used: row.try_get("tokens_used")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        Ok(Conversation {
            id: parse_uuid(&self.id, "conversation id")?,
            title: self.title,
            model_id: self.model_id,
            system_prompt: self.system_prompt,
            message_count: self.message_count.max(0) as u32,
            tokens_used: self.tokens_used.max(0) as u64,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct ChatMessageRow {
    id: String,
    conversation_id: String,
    role: String,
    status: String,
    content: String,
    error: Option<String>,
    stop_reason: Option<String>,
    parent_id: Option<String>,
    regenerate_count: i64,
    is_active: bool,
    model_id: Option<String>,
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
    latency_ms: Option<i64>,
    feedback: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            role: row.try_get("role")?,
            status: row.try_get("status")?,
            content: row.try_get("content")?,
            error: row.try_get("error")?,
            stop_reason: row.try_get("stop_reason")?,
            parent_id: row.try_get("parent_id")?,
            regenerate_count: row.try_get("regenerate_count")?,
            is_active: row.try_get("is_active")?,
            model_id: row.try_get("model_id")?,
            prompt_tokens: row.try_get("prompt_tokens")?,
            completion_tokens: row.try_get("completion_tokens")?,
            total_tokens: row.try_get("total_tokens")?,
            latency_ms: row.try_get("latency_ms")?,
            feedback: row.try_get("feedback")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let role: MessageRole = self.role.parse().map_err(RepositoryError::Query)?;
        let status: MessageStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let stop_reason: Option<StopReason> = self
            .stop_reason
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(RepositoryError::Query)?;
        let feedback: Option<Feedback> = self
            .feedback
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(RepositoryError::Query)?;
        let parent_id = self
            .parent_id
            .as_deref()
            .map(|s| parse_uuid(s, "parent_id"))
            .transpose()?;

        Ok(ChatMessage {
            id: parse_uuid(&self.id, "message id")?,
            conversation_id: parse_uuid(&self.conversation_id, "conversation_id")?,
            role,
            status,
            content: self.content,
            error: self.error,
            stop_reason,
            parent_id,
            regenerate_count: self.regenerate_count.max(0) as u32,
            is_active: self.is_active,
            model_id: self.model_id,
            prompt_tokens: self.prompt_tokens.max(0) as u32,
            completion_tokens: self.completion_tokens.max(0) as u32,
            total_tokens: self.total_tokens.max(0) as u32,
            latency_ms: self.latency_ms.map(|v| v.max(0) as u64),
            feedback,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so text order matches time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn rows_to_messages(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ChatMessage>, RepositoryError> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let msg_row = ChatMessageRow::from_row(row).map_err(query_err)?;
        messages.push(msg_row.into_message()?);
    }
    Ok(messages)
}

const INSERT_MESSAGE: &str = r#"INSERT INTO chat_messages (
        id, conversation_id, role, status, content, error, stop_reason, parent_id,
        regenerate_count, is_active, model_id, prompt_tokens, completion_tokens,
        total_tokens, latency_ms, feedback, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

const UPDATE_MESSAGE: &str = r#"UPDATE chat_messages
    SET status = ?, content = ?, error = ?, stop_reason = ?, is_active = ?,
        prompt_tokens = ?, completion_tokens = ?, total_tokens = ?, latency_ms = ?,
        feedback = ?, updated_at = ?
    WHERE id = ?"#;

const BUMP_MESSAGE_COUNT: &str =
    "UPDATE conversations SET message_count = message_count + 1, updated_at = ? WHERE id = ?";

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn insert_message_query(m: &ChatMessage) -> SqliteQuery<'_> {
    sqlx::query(INSERT_MESSAGE)
        .bind(m.id.to_string())
        .bind(m.conversation_id.to_string())
        .bind(m.role.to_string())
        .bind(m.status.to_string())
        .bind(&m.content)
        .bind(&m.error)
        .bind(m.stop_reason.map(|r| r.to_string()))
        .bind(m.parent_id.map(|p| p.to_string()))
        .bind(i64::from(m.regenerate_count))
        .bind(m.is_active)
        .bind(&m.model_id)
        .bind(i64::from(m.prompt_tokens))
        .bind(i64::from(m.completion_tokens))
        .bind(i64::from(m.total_tokens))
        .bind(m.latency_ms.map(|v| v as i64))
        .bind(m.feedback.map(|f| f.to_string()))
        .bind(format_datetime(&m.created_at))
        .bind(format_datetime(&m.updated_at))
}

fn update_message_query(m: &ChatMessage) -> SqliteQuery<'_> {
    sqlx::query(UPDATE_MESSAGE)
        .bind(m.status.to_string())
        .bind(&m.content)
        .bind(&m.error)
        .bind(m.stop_reason.map(|r| r.to_string()))
        .bind(m.is_active)
        .bind(i64::from(m.prompt_tokens))
        .bind(i64::from(m.completion_tokens))
        .bind(i64::from(m.total_tokens))
        .bind(m.latency_ms.map(|v| v as i64))
        .bind(m.feedback.map(|f| f.to_string()))
        .bind(format_datetime(&m.updated_at))
        .bind(m.id.to_string())
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<Conversation, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversations (id, title, model_id, system_prompt, message_count, tokens_used, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(conversation.id.to_string())
        .bind(&conversation.title)
        .bind(&conversation.model_id)
        .bind(&conversation.system_prompt)
        .bind(i64::from(conversation.message_count))
        .bind(conversation.tokens_used as i64)
        .bind(format_datetime(&conversation.created_at))
        .bind(format_datetime(&conversation.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.message().contains("UNIQUE")
            {
                return RepositoryError::Conflict(format!(
                    "conversation {} already exists",
                    conversation.id
                ));
            }
            query_err(e)
        })?;

        Ok(conversation.clone())
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let conv_row = ConversationRow::from_row(&row).map_err(query_err)?;
                Ok(Some(conv_row.into_conversation()?))
            }
            None => Ok(None),
        }
    }

    async fn list_conversations(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM conversations ORDER BY created_at DESC, id DESC");

        // SQLite requires LIMIT when OFFSET is given; -1 means unbounded.
        match (limit, offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(_)) => sql.push_str(" LIMIT -1"),
            (None, None) => {}
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in &rows {
            let conv_row = ConversationRow::from_row(row).map_err(query_err)?;
            conversations.push(conv_row.into_conversation()?);
        }
        Ok(conversations)
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE conversations
               SET title = ?, model_id = ?, system_prompt = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&conversation.title)
        .bind(&conversation.model_id)
        .bind(&conversation.system_prompt)
        .bind(format_datetime(&Utc::now()))
        .bind(conversation.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_conversation(&self, id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn clear_messages(&self, conversation_id: &Uuid) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query("DELETE FROM chat_messages WHERE conversation_id = ?")
            .bind(conversation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        let result = sqlx::query(
            "UPDATE conversations SET message_count = 0, tokens_used = 0, updated_at = ? WHERE id = ?",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(conversation_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn add_conversation_tokens(&self, conversation_id: &Uuid, tokens: u64) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations SET tokens_used = tokens_used + ?, updated_at = ? WHERE id = ?",
        )
        .bind(tokens as i64)
        .bind(format_datetime(&Utc::now()))
        .bind(conversation_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        insert_message_query(message)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        sqlx::query(BUMP_MESSAGE_COUNT)
            .bind(format_datetime(&Utc::now()))
            .bind(message.conversation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get_message(&self, id: &Uuid) -> Result<Option<ChatMessage>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_messages WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let msg_row = ChatMessageRow::from_row(&row).map_err(query_err)?;
                Ok(Some(msg_row.into_message()?))
            }
            None => Ok(None),
        }
    }

    async fn list_messages(
        &self,
        conversation_id: &Uuid,
        filter: MessageFilter,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM chat_messages WHERE conversation_id = ?");
        if filter.active_only {
            sql.push_str(" AND is_active = 1");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut query = sqlx::query(&sql).bind(conversation_id.to_string());
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }

        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;
        rows_to_messages(&rows)
    }

    async fn update_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        let result = update_message_query(message)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn mark_stopped(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE chat_messages
               SET status = 'stopped', stop_reason = 'user', updated_at = ?
               WHERE id = ? AND status IN ('pending', 'streaming')"#,
        )
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get_message(id).await? {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn replace_message(&self, original: &ChatMessage, replacement: &ChatMessage) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let result = update_message_query(original)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        insert_message_query(replacement)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        sqlx::query(BUMP_MESSAGE_COUNT)
            .bind(format_datetime(&Utc::now()))
            .bind(replacement.conversation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::DatabasePool;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::open(&url).await.unwrap()
    }

    async fn repo_with_conversation() -> (SqliteChatRepository, Conversation) {
        let repo = SqliteChatRepository::new(test_pool().await);
        let conv = Conversation::new(
            Some("Test".to_string()),
            Some("echo-1".to_string()),
            Some("Be kind.".to_string()),
        );
        repo.create_conversation(&conv).await.unwrap();
        (repo, conv)
    }

    #[tokio::test]
    async fn test_create_and_get_conversation() {
        let (repo, conv) = repo_with_conversation().await;
        let found = repo.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(found, conv);
        assert!(repo.get_conversation(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_conversation_is_conflict() {
        let (repo, conv) = repo_with_conversation().await;
        let err = repo.create_conversation(&conv).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_conversations_newest_first_with_paging() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let mut ids = Vec::new();
        for i in 0..3 {
            let conv = Conversation::new(Some(format!("c{i}")), None, None);
            repo.create_conversation(&conv).await.unwrap();
            ids.push(conv.id);
        }

        let all = repo.list_conversations(None, None).await.unwrap();
        let listed: Vec<Uuid> = all.iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);

        let page = repo.list_conversations(Some(1), Some(1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, ids[1]);

        let tail = repo.list_conversations(None, Some(2)).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_create_message_roundtrip_and_count() {
        let (repo, conv) = repo_with_conversation().await;
        let user = ChatMessage::user(conv.id, "hello");
        let mut assistant = ChatMessage::pending_assistant(conv.id, "echo-1");
        repo.create_message(&user).await.unwrap();
        repo.create_message(&assistant).await.unwrap();

        assistant.content = "hi there".to_string();
        assistant.finish(MessageStatus::Completed, StopReason::EndTurn);
        assistant.prompt_tokens = 3;
        assistant.completion_tokens = 2;
        assistant.total_tokens = 5;
        assistant.latency_ms = Some(12);
        assistant.feedback = Some(Feedback::Like);
        repo.update_message(&assistant).await.unwrap();

        let found = repo.get_message(&assistant.id).await.unwrap().unwrap();
        assert_eq!(found, assistant);

        let conv = repo.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(conv.message_count, 2);

        let listed = repo.list_messages(&conv.id, MessageFilter::all()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, user.id);
        assert_eq!(listed[1].id, assistant.id);
    }

    #[tokio::test]
    async fn test_message_for_missing_conversation_fails() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let orphan = ChatMessage::user(Uuid::now_v7(), "lost");
        assert!(repo.create_message(&orphan).await.is_err());
        assert!(repo.get_message(&orphan.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_message_is_not_found() {
        let (repo, conv) = repo_with_conversation().await;
        let ghost = ChatMessage::user(conv.id, "ghost");
        let err = repo.update_message(&ghost).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_messages_filters() {
        let (repo, conv) = repo_with_conversation().await;
        let user = ChatMessage::user(conv.id, "q");
        let mut failed = ChatMessage::pending_assistant(conv.id, "echo-1");
        repo.create_message(&user).await.unwrap();
        repo.create_message(&failed).await.unwrap();
        failed.finish(MessageStatus::Failed, StopReason::Error);
        failed.is_active = false;
        repo.update_message(&failed).await.unwrap();

        let active = repo.list_messages(&conv.id, MessageFilter::active()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, user.id);

        let history = repo.list_messages(&conv.id, MessageFilter::history()).await.unwrap();
        assert_eq!(history.len(), 1);

        let failed_only = repo
            .list_messages(
                &conv.id,
                MessageFilter {
                    active_only: false,
                    status: Some(MessageStatus::Failed),
                },
            )
            .await
            .unwrap();
        assert_eq!(failed_only.len(), 1);
        assert_eq!(failed_only[0].id, failed.id);
    }

    #[tokio::test]
    async fn test_mark_stopped_only_touches_running_messages() {
        let (repo, conv) = repo_with_conversation().await;
        let mut streaming = ChatMessage::pending_assistant(conv.id, "echo-1");
        repo.create_message(&streaming).await.unwrap();
        streaming.status = MessageStatus::Streaming;
        repo.update_message(&streaming).await.unwrap();

        assert!(repo.mark_stopped(&streaming.id).await.unwrap());
        let stopped = repo.get_message(&streaming.id).await.unwrap().unwrap();
        assert_eq!(stopped.status, MessageStatus::Stopped);
        assert_eq!(stopped.stop_reason, Some(StopReason::User));

        // Already terminal: unchanged.
        assert!(!repo.mark_stopped(&streaming.id).await.unwrap());

        let err = repo.mark_stopped(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_replace_message_deactivates_and_links() {
        let (repo, conv) = repo_with_conversation().await;
        let mut original = ChatMessage::pending_assistant(conv.id, "echo-1");
        repo.create_message(&original).await.unwrap();
        original.content = "v1".to_string();
        original.finish(MessageStatus::Completed, StopReason::EndTurn);
        repo.update_message(&original).await.unwrap();

        original.is_active = false;
        let replacement = ChatMessage::regeneration_of(&original, "echo-1");
        repo.replace_message(&original, &replacement).await.unwrap();

        let old = repo.get_message(&original.id).await.unwrap().unwrap();
        assert!(!old.is_active);
        assert_eq!(old.content, "v1");

        let new = repo.get_message(&replacement.id).await.unwrap().unwrap();
        assert_eq!(new.parent_id, Some(original.id));
        assert_eq!(new.regenerate_count, 1);
        assert!(new.is_active);

        let conv = repo.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(conv.message_count, 2);
    }

    #[tokio::test]
    async fn test_replacement_lists_in_place_of_original() {
        let (repo, conv) = repo_with_conversation().await;
        let q1 = ChatMessage::user(conv.id, "q1");
        repo.create_message(&q1).await.unwrap();
        let mut original = ChatMessage::pending_assistant(conv.id, "echo-1");
        repo.create_message(&original).await.unwrap();
        let q2 = ChatMessage::user(conv.id, "q2");
        repo.create_message(&q2).await.unwrap();

        original.is_active = false;
        let replacement = ChatMessage::regeneration_of(&original, "echo-1");
        repo.replace_message(&original, &replacement).await.unwrap();

        let ids: Vec<Uuid> = repo
            .list_messages(&conv.id, MessageFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![q1.id, original.id, replacement.id, q2.id]);
    }

    #[tokio::test]
    async fn test_replace_message_rolls_back_when_original_missing() {
        let (repo, conv) = repo_with_conversation().await;
        let original = ChatMessage::pending_assistant(conv.id, "echo-1");
        let replacement = ChatMessage::regeneration_of(&original, "echo-1");

        let err = repo.replace_message(&original, &replacement).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
        assert!(repo.get_message(&replacement.id).await.unwrap().is_none());
        let conv = repo.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(conv.message_count, 0);
    }

    #[tokio::test]
    async fn test_tokens_clear_and_delete() {
        let (repo, conv) = repo_with_conversation().await;
        repo.create_message(&ChatMessage::user(conv.id, "a")).await.unwrap();
        repo.add_conversation_tokens(&conv.id, 40).await.unwrap();
        repo.add_conversation_tokens(&conv.id, 2).await.unwrap();

        let found = repo.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(found.tokens_used, 42);
        assert_eq!(found.message_count, 1);

        repo.clear_messages(&conv.id).await.unwrap();
        let cleared = repo.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(cleared.tokens_used, 0);
        assert_eq!(cleared.message_count, 0);
        assert!(repo.list_messages(&conv.id, MessageFilter::all()).await.unwrap().is_empty());

        let kept = ChatMessage::user(conv.id, "b");
        repo.create_message(&kept).await.unwrap();
        repo.delete_conversation(&conv.id).await.unwrap();
        assert!(repo.get_conversation(&conv.id).await.unwrap().is_none());
        assert!(repo.get_message(&kept.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete_conversation(&conv.id).await.unwrap_err(),
            RepositoryError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_update_conversation_fields() {
        let (repo, mut conv) = repo_with_conversation().await;
        conv.title = Some("Renamed".to_string());
        conv.system_prompt = None;
        repo.update_conversation(&conv).await.unwrap();

        let found = repo.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(found.title.as_deref(), Some("Renamed"));
        assert!(found.system_prompt.is_none());
        assert!(found.updated_at >= conv.updated_at);
    }
}
