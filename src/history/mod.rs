mod memory;
mod redis;

pub use self::memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

use async_trait::async_trait;
use log::{ error, info, warn };
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation };

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("history backend failure: {0}")]
    Backend(String),

    #[error("stored conversation '{key}' is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize conversation: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Raw key-value capability the conversation store sits on.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

pub fn create_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "redis" => {
            let store = RedisHistoryStore::new(&args.history_host, args.history_ttl)?;
            Ok(Arc::new(store))
        }
        "memory" => {
            warn!("Using in-memory history store; transcripts are lost on restart.");
            Ok(Arc::new(MemoryHistoryStore::new()))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_history_store(
    args: &Args
) -> Result<ConversationStore, Box<dyn Error + Send + Sync>> {
    info!("Chat history will be stored in: {} at {}", args.history_type, args.history_host);
    let backend = create_history_store(args)?;
    Ok(ConversationStore::new(backend, args.history_redis_prefix.clone()))
}

/// Reads and writes whole transcripts, one JSON array per conversation id.
///
/// The chat path is fail-open: history is a convenience, so an unreachable or corrupt store
/// degrades to "no memory" on read and to a logged, unretried loss on write. Callers that
/// need to tell "missing" from "broken" use [`ConversationStore::load`].
pub struct ConversationStore {
    backend: Arc<dyn HistoryStore>,
    key_prefix: String,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn HistoryStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.key_prefix, conversation_id)
    }

    pub async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        let key = self.key(conversation_id);
        let Some(raw) = self.backend.get(&key).await? else {
            return Ok(None);
        };
        let messages: Vec<ChatMessage> = serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            key,
            source,
        })?;
        Ok(Some(Conversation::from_messages(conversation_id, messages)))
    }

    pub async fn read(&self, conversation_id: &str) -> Vec<ChatMessage> {
        match self.load(conversation_id).await {
            Ok(Some(conversation)) => conversation.messages,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("History read for {} failed, continuing without it: {}", conversation_id, e);
                Vec::new()
            }
        }
    }

    pub async fn write(&self, conversation_id: &str, messages: &[ChatMessage]) -> bool {
        let result = match serde_json::to_string(messages) {
            Ok(json) => self.backend.set(&self.key(conversation_id), &json).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("History write for {} failed, turn not persisted: {}", conversation_id, e);
                false
            }
        }
    }
}
