//! Chat service: the lifecycle operations layered on the generation drivers.
//!
//! `start` and `regenerate` prepare a [`Generation`] (records created,
//! context window built) which the caller then dispatches to the streaming
//! or one-shot driver. `stop` cancels an in-flight stream. The remaining
//! methods manage conversations, messages and feedback.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::chat::{ChatMessage, Conversation, Feedback, MessageRole, MessageStatus};
use parley_types::config::{ContextConfig, TokenizerConfig};
use parley_types::error::{ChatError, RepositoryError};
use parley_types::llm::{CompletionRequest, Message};

use super::driver::{Generation, GenerationDriver};
use crate::context::ContextWindow;
use crate::llm::{ModelRegistry, RegisteredModel};
use crate::repository::{ChatRepository, MessageFilter};
use crate::sse::EventSink;
use crate::stream::{RegistryError, StreamRegistry};

/// Longest auto-generated conversation title, in characters.
const TITLE_MAX_CHARS: usize = 50;

/// Input to [`ChatService::start`].
#[derive(Debug, Clone, Default)]
pub struct StartChat {
    /// Existing conversation to continue; a new one is created when absent.
    pub conversation_id: Option<Uuid>,
    pub model_id: String,
    /// New user turns, oldest first.
    pub messages: Vec<String>,
    pub stream: bool,
    pub system_prompt: Option<String>,
}

/// Input to [`ChatService::create_conversation`].
#[derive(Debug, Clone, Default)]
pub struct NewConversation {
    pub title: Option<String>,
    pub model_id: Option<String>,
    pub system_prompt: Option<String>,
}

/// A generation whose records exist and whose prompt is built, ready to dispatch.
#[derive(Debug)]
pub struct PreparedGeneration {
    pub conversation: Conversation,
    pub generation: Generation,
    pub stream: bool,
}

impl PreparedGeneration {
    pub fn message_id(&self) -> Uuid {
        self.generation.message.id
    }
}

/// Orchestrates the chat lifecycle.
///
/// Generic over `ChatRepository` to maintain clean architecture
/// (parley-core never depends on parley-infra).
pub struct ChatService<R: ChatRepository> {
    repo: Arc<R>,
    models: Arc<ModelRegistry>,
    streams: Arc<StreamRegistry>,
    driver: GenerationDriver<R>,
    context: ContextConfig,
    tokenizer: TokenizerConfig,
}

impl<R: ChatRepository> ChatService<R> {
    pub fn new(
        repo: Arc<R>,
        models: Arc<ModelRegistry>,
        streams: Arc<StreamRegistry>,
        context: ContextConfig,
        tokenizer: TokenizerConfig,
    ) -> Self {
        Self {
            driver: GenerationDriver::new(Arc::clone(&repo), Arc::clone(&streams)),
            repo,
            models,
            streams,
            context,
            tokenizer,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Number of generations currently streaming.
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    // --- Lifecycle ---

    /// Record new user turns and prepare the assistant reply.
    pub async fn start(&self, input: StartChat) -> Result<PreparedGeneration, ChatError> {
        let model = self.resolve_model(&input.model_id)?;
        let inputs: Vec<String> = input
            .messages
            .into_iter()
            .filter(|m| !m.trim().is_empty())
            .collect();
        if inputs.is_empty() {
            return Err(ChatError::Validation(
                "messages must contain at least one non-empty entry".to_string(),
            ));
        }

        let conversation = match input.conversation_id {
            Some(id) => {
                let mut conversation = self.require_conversation(&id).await?;
                if let Some(prompt) = input.system_prompt
                    && conversation.system_prompt.as_deref() != Some(prompt.as_str())
                {
                    conversation.system_prompt = Some(prompt);
                    self.repo.update_conversation(&conversation).await?;
                }
                conversation
            }
            None => {
                let conversation = Conversation::new(
                    Some(auto_title(&inputs[0])),
                    Some(model.info.id.clone()),
                    input.system_prompt,
                );
                let conversation = self.repo.create_conversation(&conversation).await?;
                info!(conversation_id = %conversation.id, "conversation created");
                conversation
            }
        };

        let stored = self
            .repo
            .list_messages(&conversation.id, MessageFilter::history())
            .await?;
        let history = prompt_history(&conversation, &stored);

        for text in &inputs {
            self.repo
                .create_message(&ChatMessage::user(conversation.id, text.as_str()))
                .await?;
        }

        let window = ContextWindow::for_model(&model.info, &self.context, &self.tokenizer);
        let messages = window.build(&history, &inputs);

        let assistant = ChatMessage::pending_assistant(conversation.id, model.info.id.as_str());
        self.repo.create_message(&assistant).await?;

        info!(
            conversation_id = %conversation.id,
            message_id = %assistant.id,
            model = %model.info.id,
            prompt_messages = messages.len(),
            "generation prepared"
        );

        let conversation = self.refreshed(conversation).await;
        Ok(self.prepare(conversation, assistant, &model, &window, messages, input.stream))
    }

    /// Stop a streaming generation.
    ///
    /// The message must be `streaming`. It ends `stopped` with reason `user`
    /// even when the stream already finished and left the registry.
    pub async fn stop(&self, message_id: Uuid) -> Result<ChatMessage, ChatError> {
        let message = self.require_message(&message_id).await?;
        if message.status != MessageStatus::Streaming {
            return Err(ChatError::InvalidStatus {
                id: message_id,
                expected: MessageStatus::Streaming.to_string(),
                actual: message.status,
            });
        }

        match self.streams.cancel(message_id) {
            Ok(()) => info!(message_id = %message_id, "stop requested"),
            Err(e @ RegistryError::NotFound(_)) => {
                warn!(message_id = %message_id, error = %e, "stop found no active stream, marking stopped anyway");
            }
            Err(e) => warn!(message_id = %message_id, error = %e, "unexpected registry error on stop"),
        }

        if let Err(e) = self.repo.mark_stopped(&message_id).await {
            warn!(message_id = %message_id, error = %e, "failed to persist stop");
        }
        Ok(self.repo.get_message(&message_id).await?.unwrap_or(message))
    }

    /// Prepare a new version of an assistant message.
    ///
    /// The original is deactivated (never deleted or mutated otherwise) and a
    /// new `pending` message linked through `parent_id` takes its place. The
    /// prompt is the active, completed history up to and including the user
    /// turn that preceded the original.
    pub async fn regenerate(&self, message_id: Uuid, stream: bool) -> Result<PreparedGeneration, ChatError> {
        let mut original = self.require_message(&message_id).await?;
        if original.role != MessageRole::Assistant {
            return Err(ChatError::InvalidRole {
                id: message_id,
                expected: MessageRole::Assistant,
                actual: original.role,
            });
        }
        if !original.status.is_terminal() {
            return Err(ChatError::InvalidStatus {
                id: message_id,
                expected: "completed, stopped or failed".to_string(),
                actual: original.status,
            });
        }

        let conversation = self.require_conversation(&original.conversation_id).await?;
        let model_id = original
            .model_id
            .clone()
            .or_else(|| conversation.model_id.clone())
            .ok_or_else(|| ChatError::Validation(format!("message {message_id} has no model")))?;
        let model = self.resolve_model(&model_id)?;

        let all = self
            .repo
            .list_messages(&conversation.id, MessageFilter::all())
            .await?;
        let position = all
            .iter()
            .position(|m| m.id == message_id)
            .ok_or(ChatError::MessageNotFound(message_id))?;
        let user_index = all[..position]
            .iter()
            .rposition(|m| m.role == MessageRole::User)
            .ok_or_else(|| {
                ChatError::Validation(format!("no user message precedes message {message_id}"))
            })?;

        let filter = MessageFilter::history();
        let truncated: Vec<ChatMessage> = all[..=user_index]
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        let history = prompt_history(&conversation, &truncated);

        original.is_active = false;
        original.updated_at = chrono::Utc::now();
        let replacement = ChatMessage::regeneration_of(&original, model.info.id.as_str());
        self.repo.replace_message(&original, &replacement).await?;

        let window = ContextWindow::for_model(&model.info, &self.context, &self.tokenizer);
        let messages = window.build::<&str>(&history, &[]);

        info!(
            conversation_id = %conversation.id,
            original_id = %message_id,
            message_id = %replacement.id,
            regenerate_count = replacement.regenerate_count,
            "regeneration prepared"
        );

        let conversation = self.refreshed(conversation).await;
        Ok(self.prepare(conversation, replacement, &model, &window, messages, stream))
    }

    /// Run a prepared generation as a stream into `sink`.
    pub async fn dispatch_stream<S: EventSink>(
        &self,
        prepared: PreparedGeneration,
        scope: &CancellationToken,
        sink: &S,
    ) -> ChatMessage {
        self.driver.stream(prepared.generation, scope, sink).await
    }

    /// Run a prepared generation in one shot.
    pub async fn dispatch(&self, prepared: PreparedGeneration) -> Result<ChatMessage, ChatError> {
        self.driver.generate(prepared.generation).await
    }

    // --- Conversations ---

    pub async fn create_conversation(&self, input: NewConversation) -> Result<Conversation, ChatError> {
        if let Some(model_id) = &input.model_id {
            self.resolve_model(model_id)?;
        }
        let conversation = Conversation::new(input.title, input.model_id, input.system_prompt);
        let conversation = self.repo.create_conversation(&conversation).await?;
        info!(conversation_id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Conversation, ChatError> {
        self.require_conversation(&id).await
    }

    pub async fn list_conversations(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.repo.list_conversations(limit, offset).await?)
    }

    pub async fn delete_conversation(&self, id: Uuid) -> Result<(), ChatError> {
        match self.repo.delete_conversation(&id).await {
            Ok(()) => {
                info!(conversation_id = %id, "conversation deleted");
                Ok(())
            }
            Err(RepositoryError::NotFound) => Err(ChatError::ConversationNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove all messages and reset the conversation's counters.
    pub async fn clear_conversation(&self, id: Uuid) -> Result<Conversation, ChatError> {
        self.require_conversation(&id).await?;
        self.repo.clear_messages(&id).await?;
        info!(conversation_id = %id, "conversation cleared");
        self.require_conversation(&id).await
    }

    // --- Messages ---

    pub async fn list_messages(&self, conversation_id: Uuid, active_only: bool) -> Result<Vec<ChatMessage>, ChatError> {
        self.require_conversation(&conversation_id).await?;
        let filter = if active_only {
            MessageFilter::active()
        } else {
            MessageFilter::all()
        };
        Ok(self.repo.list_messages(&conversation_id, filter).await?)
    }

    pub async fn get_message(&self, id: Uuid) -> Result<ChatMessage, ChatError> {
        self.require_message(&id).await
    }

    /// Record like/dislike on a finished message.
    pub async fn submit_feedback(&self, message_id: Uuid, feedback: Feedback) -> Result<ChatMessage, ChatError> {
        let mut message = self.require_message(&message_id).await?;
        if !message.status.accepts_feedback() {
            return Err(ChatError::InvalidStatus {
                id: message_id,
                expected: "completed, stopped or failed".to_string(),
                actual: message.status,
            });
        }
        message.feedback = Some(feedback);
        message.updated_at = chrono::Utc::now();
        self.repo.update_message(&message).await?;
        info!(message_id = %message_id, %feedback, "feedback recorded");
        Ok(message)
    }

    // --- Helpers ---

    fn resolve_model(&self, model_id: &str) -> Result<RegisteredModel, ChatError> {
        if model_id.trim().is_empty() {
            return Err(ChatError::Validation("model_id is required".to_string()));
        }
        self.models
            .get(model_id)
            .cloned()
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))
    }

    async fn require_conversation(&self, id: &Uuid) -> Result<Conversation, ChatError> {
        self.repo
            .get_conversation(id)
            .await?
            .ok_or(ChatError::ConversationNotFound(*id))
    }

    async fn require_message(&self, id: &Uuid) -> Result<ChatMessage, ChatError> {
        self.repo
            .get_message(id)
            .await?
            .ok_or(ChatError::MessageNotFound(*id))
    }

    /// Re-read counters after messages were added; falls back to `stale`.
    async fn refreshed(&self, stale: Conversation) -> Conversation {
        match self.repo.get_conversation(&stale.id).await {
            Ok(Some(fresh)) => fresh,
            _ => stale,
        }
    }

    fn prepare(
        &self,
        conversation: Conversation,
        message: ChatMessage,
        model: &RegisteredModel,
        window: &ContextWindow,
        messages: Vec<Message>,
        stream: bool,
    ) -> PreparedGeneration {
        PreparedGeneration {
            conversation,
            generation: Generation {
                message,
                request: CompletionRequest {
                    model: model.info.id.clone(),
                    messages,
                    max_tokens: model.info.max_output_tokens,
                    temperature: None,
                    stream,
                },
                provider: Arc::clone(&model.provider),
                counter: window.counter().clone(),
            },
            stream,
        }
    }
}

/// Stored turns as prompt messages, led by the conversation's system prompt.
fn prompt_history(conversation: &Conversation, stored: &[ChatMessage]) -> Vec<Message> {
    conversation
        .system_prompt
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| Message::system(p.as_str()))
        .chain(stored.iter().map(|m| Message::new(m.role, m.content.as_str())))
        .collect()
}

fn auto_title(input: &str) -> String {
    input.trim().chars().take(TITLE_MAX_CHARS).collect::<String>().trim_end().to_string()
}
