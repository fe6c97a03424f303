//! Test doubles shared by the chat tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_types::chat::{ChatMessage, Conversation, MessageStatus};
use parley_types::error::RepositoryError;
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StopReason, StreamEvent, Usage,
};

use crate::llm::{LlmProvider, StreamEventStream};
use crate::repository::{ChatRepository, MessageFilter};

#[derive(Default)]
struct State {
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<ChatMessage>,
}

/// `ChatRepository` backed by a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryChatRepository {
    state: Mutex<State>,
}

impl InMemoryChatRepository {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn bump(state: &mut State, conversation_id: &Uuid) -> Result<(), RepositoryError> {
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        conv.message_count += 1;
        conv.updated_at = Utc::now();
        Ok(())
    }
}

impl ChatRepository for InMemoryChatRepository {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<Conversation, RepositoryError> {
        self.state()
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation.clone())
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.state().conversations.get(id).cloned())
    }

    async fn list_conversations(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let mut all: Vec<Conversation> = self.state().conversations.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all
            .into_iter()
            .skip(offset.unwrap_or(0) as usize)
            .take(limit.unwrap_or(i64::MAX) as usize)
            .collect())
    }

    async fn update_conversation(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let existing = state
            .conversations
            .get_mut(&conversation.id)
            .ok_or(RepositoryError::NotFound)?;
        existing.title = conversation.title.clone();
        existing.model_id = conversation.model_id.clone();
        existing.system_prompt = conversation.system_prompt.clone();
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_conversation(&self, id: &Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state();
        state
            .conversations
            .remove(id)
            .ok_or(RepositoryError::NotFound)?;
        state.messages.retain(|m| m.conversation_id != *id);
        Ok(())
    }

    async fn clear_messages(&self, conversation_id: &Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        conv.message_count = 0;
        conv.tokens_used = 0;
        conv.updated_at = Utc::now();
        state.messages.retain(|m| m.conversation_id != *conversation_id);
        Ok(())
    }

    async fn add_conversation_tokens(&self, conversation_id: &Uuid, tokens: u64) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        conv.tokens_used += tokens;
        Ok(())
    }

    async fn create_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        let mut state = self.state();
        Self::bump(&mut state, &message.conversation_id)?;
        state.messages.push(message.clone());
        Ok(())
    }

    async fn get_message(&self, id: &Uuid) -> Result<Option<ChatMessage>, RepositoryError> {
        Ok(self.state().messages.iter().find(|m| m.id == *id).cloned())
    }

    async fn list_messages(
        &self,
        conversation_id: &Uuid,
        filter: MessageFilter,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut out: Vec<ChatMessage> = self
            .state()
            .messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id && filter.matches(m))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn update_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let slot = state
            .messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = message.clone();
        Ok(())
    }

    async fn mark_stopped(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        let slot = state
            .messages
            .iter_mut()
            .find(|m| m.id == *id)
            .ok_or(RepositoryError::NotFound)?;
        if slot.status.is_terminal() {
            return Ok(false);
        }
        slot.finish(MessageStatus::Stopped, StopReason::User);
        Ok(true)
    }

    async fn replace_message(&self, original: &ChatMessage, replacement: &ChatMessage) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let slot = state
            .messages
            .iter_mut()
            .find(|m| m.id == original.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = original.clone();
        Self::bump(&mut state, &replacement.conversation_id)?;
        state.messages.push(replacement.clone());
        Ok(())
    }
}

/// One scripted backend action.
#[derive(Debug, Clone)]
pub enum Step {
    Text(&'static str),
    Usage(Usage),
    Finish(StopReason),
    Done,
    Fail(&'static str),
    /// Never produce another event.
    Hang,
}

/// Backend that replays a fixed script and records every request it receives.
#[derive(Clone)]
pub struct ScriptedProvider {
    steps: Vec<Step>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Handle onto the requests this provider (and its clones) received.
    pub fn requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut content = String::new();
        let mut usage = None;
        let mut stop_reason = None;
        for step in &self.steps {
            match step {
                Step::Text(t) => content.push_str(t),
                Step::Usage(u) => usage = Some(*u),
                Step::Finish(r) => stop_reason = Some(*r),
                Step::Fail(m) => {
                    return Err(LlmError::Provider {
                        message: m.to_string(),
                    });
                }
                Step::Done | Step::Hang => {}
            }
        }
        Ok(CompletionResponse {
            content,
            model: request.model.clone(),
            stop_reason,
            usage,
        })
    }

    fn stream(&self, request: CompletionRequest) -> StreamEventStream {
        self.requests.lock().unwrap().push(request);
        let steps = self.steps.clone();
        let delay = self.delay;
        Box::pin(async_stream::stream! {
            for step in steps {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                match step {
                    Step::Text(t) => yield Ok(StreamEvent::TextDelta { text: t.to_string() }),
                    Step::Usage(u) => yield Ok(StreamEvent::Usage(u)),
                    Step::Finish(r) => yield Ok(StreamEvent::Finish { stop_reason: r }),
                    Step::Done => yield Ok(StreamEvent::Done),
                    Step::Fail(m) => {
                        yield Err(LlmError::Provider { message: m.to_string() });
                        return;
                    }
                    Step::Hang => futures_util::future::pending::<()>().await,
                }
            }
        })
    }
}

/// Drain a sink receiver into UTF-8 frames.
pub async fn collect_frames(mut rx: mpsc::Receiver<Bytes>) -> Vec<String> {
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(String::from_utf8(frame.to_vec()).unwrap());
    }
    frames
}

/// The `event:` name of each frame, or "" for data-only frames.
pub fn event_names(frames: &[String]) -> Vec<String> {
    frames
        .iter()
        .map(|f| {
            f.lines()
                .find_map(|l| l.strip_prefix("event: "))
                .unwrap_or("")
                .to_string()
        })
        .collect()
}
