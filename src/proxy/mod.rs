pub mod tee;

use crate::cancel::{ AbortHandle, CancellationRegistry };
use crate::config::prompt::PromptConfig;
use crate::config::GenerationDefaults;
use crate::context;
use crate::error::ChatError;
use crate::history::{ ConversationStore, StoreError };
use crate::llm::chat::{ GenerationRequest, ModelProvider, TokenStream };
use crate::llm::ProviderError;
use crate::models::chat::{ ChatMessage, ChatOptions, Conversation };
use futures::stream;
use log::{ info, warn };
use self::tee::{ tee, ClientView, Drained };
use std::sync::Arc;
use std::time::Instant;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// A turn that has been handed to the provider.
pub struct ChatTurn {
    pub conversation_id: String,
    pub body: ClientView,
}

/// Brokers one conversational turn at a time between a client and the model provider.
///
/// The response body is returned as soon as the provider starts answering. Accumulating the
/// reply and persisting the transcript continue on a tracked background task; the server
/// waits for those tasks on shutdown.
pub struct ChatProxy {
    provider: Arc<dyn ModelProvider>,
    store: Arc<ConversationStore>,
    registry: Arc<dyn CancellationRegistry>,
    prompts: PromptConfig,
    defaults: GenerationDefaults,
    tasks: TaskTracker,
}

impl ChatProxy {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        store: Arc<ConversationStore>,
        registry: Arc<dyn CancellationRegistry>,
        prompts: PromptConfig,
        defaults: GenerationDefaults
    ) -> Self {
        Self {
            provider,
            store,
            registry,
            prompts,
            defaults,
            tasks: TaskTracker::new(),
        }
    }

    pub async fn handle_chat_turn(
        &self,
        conversation_id: Option<String>,
        user_message: &str,
        options: ChatOptions
    ) -> Result<ChatTurn, ChatError> {
        if user_message.trim().is_empty() {
            return Err(ChatError::Validation("user message must not be empty".into()));
        }
        let started = Instant::now();
        let conversation_id = resolve_conversation_id(conversation_id);

        let registration = Registration::new(Arc::clone(&self.registry), &conversation_id);

        let transcript = self.store.read(&conversation_id).await;
        let user = ChatMessage::user(user_message);
        let web_search = options.web_search_enabled.unwrap_or(false);
        let assembled = self.prompts.assemble(&transcript, &user, web_search);
        let prompt = context::trim(&assembled, self.defaults.max_context_tokens);
        if prompt.len() < assembled.len() {
            info!(
                "Trimmed {} oldest messages from {} to fit {} tokens",
                assembled.len() - prompt.len(),
                conversation_id,
                self.defaults.max_context_tokens
            );
        }

        let request = GenerationRequest {
            model: options.model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.provider.get_model()),
            messages: prompt,
            temperature: self.defaults.temperature(options.temperature),
            max_tokens: self.defaults.max_tokens(options.max_tokens),
        };

        let upstream: TokenStream = match self.invoke(&request, registration.handle()).await {
            Ok(upstream) => upstream,
            Err(ProviderError::Cancelled) => {
                info!("Conversation {} cancelled before the provider responded", conversation_id);
                Box::pin(stream::empty())
            }
            Err(e) => return Err(e.into()),
        };

        let (body, accumulator) = tee(upstream, registration.handle().token());
        let completion = TurnCompletion {
            conversation_id: conversation_id.clone(),
            model: request.model,
            prompt_tokens: context::estimate(&request.messages),
            transcript,
            user,
            registration,
            started,
            store: Arc::clone(&self.store),
        };
        self.tasks.spawn(async move {
            let drained = accumulator.drain().await;
            completion.finish(drained).await;
        });

        Ok(ChatTurn { conversation_id, body })
    }

    /// One retry for failures that happened before any response; anything the provider actually
    /// answered with is final.
    async fn invoke(
        &self,
        request: &GenerationRequest,
        handle: &AbortHandle
    ) -> Result<TokenStream, ProviderError> {
        match self.provider.stream_chat(request, handle.token()).await {
            Err(e) if e.is_transport() => {
                warn!("Provider call failed ({}), retrying once", e);
                self.provider.stream_chat(request, handle.token()).await
            }
            other => other,
        }
    }

    pub fn cancel(&self, conversation_id: &str) -> bool {
        self.registry.cancel(conversation_id)
    }

    pub async fn history(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        self.store.load(conversation_id).await
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Resolves once every persistence task spawned so far has finished. New turns may still
    /// be started afterwards.
    pub async fn wait_for_pending(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

/// Supplied ids are used verbatim. Absent, blank and `"null"` ids start a new conversation.
fn resolve_conversation_id(supplied: Option<String>) -> String {
    supplied
        .filter(|id| !id.trim().is_empty() && id != "null")
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// A turn's entry in the cancellation registry. The entry is cleared when the guard is dropped,
/// so a turn abandoned at any await point never leaves a handle behind.
struct Registration {
    registry: Arc<dyn CancellationRegistry>,
    conversation_id: String,
    handle: AbortHandle,
}

impl Registration {
    fn new(registry: Arc<dyn CancellationRegistry>, conversation_id: &str) -> Self {
        let handle = AbortHandle::new();
        if registry.register(conversation_id, handle.clone()).is_some() {
            warn!(
                "Conversation {} already had a turn in flight; it can no longer be cancelled",
                conversation_id
            );
        }
        Self {
            registry,
            conversation_id: conversation_id.to_string(),
            handle,
        }
    }

    fn handle(&self) -> &AbortHandle {
        &self.handle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.clear(&self.conversation_id, &self.handle);
    }
}

/// Everything the background half of a turn needs once the stream has drained.
struct TurnCompletion {
    conversation_id: String,
    model: String,
    prompt_tokens: usize,
    transcript: Vec<ChatMessage>,
    user: ChatMessage,
    registration: Registration,
    started: Instant,
    store: Arc<ConversationStore>,
}

impl TurnCompletion {
    async fn finish(self, drained: Drained) {
        drop(self.registration);

        let completion_tokens = context::estimate_text(&drained.content);
        let mut messages = self.transcript;
        messages.push(self.user);
        messages.push(ChatMessage::assistant(drained.content, drained.interrupted));
        let persisted = self.store.write(&self.conversation_id, &messages).await;

        info!(
            "turn conversation={} model={} elapsed_ms={} prompt_tokens~{} completion_tokens~{} chunks={} interrupted={} persisted={}{}",
            self.conversation_id,
            self.model,
            self.started.elapsed().as_millis(),
            self.prompt_tokens,
            completion_tokens,
            drained.chunks,
            drained.interrupted,
            persisted,
            drained.error.map(|e| format!(" stream_error=\"{}\"", e)).unwrap_or_default()
        );
    }
}
