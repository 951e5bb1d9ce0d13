#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chat_relay::cancel::InMemoryCancellationRegistry;
use chat_relay::config::prompt::PromptConfig;
use chat_relay::config::GenerationDefaults;
use chat_relay::history::{ ConversationStore, HistoryStore, MemoryHistoryStore, StoreError };
use chat_relay::llm::chat::{ GenerationRequest, ModelProvider, TokenStream };
use chat_relay::llm::ProviderError;
use chat_relay::proxy::ChatProxy;
use chat_relay::server::api::{ build_router, AppState };
use chat_relay::server::rate_limit::RateLimiter;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

pub const CLIENT_HEADER: &str = "x-forwarded-for";

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Failure {
    None,
    TransportOnce,
    TransportAlways,
    Status(u16),
}

/// Provider double that replays a fixed list of chunks.
pub struct ScriptedProvider {
    chunks: Vec<String>,
    delay: Duration,
    failure: Failure,
    hold_open: bool,
    stalled: bool,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            delay: Duration::ZERO,
            failure: Failure::None,
            hold_open: false,
            stalled: false,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }

    /// Keeps the stream open after the last chunk until the turn is cancelled.
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Never answers the request, as if the provider hung during the handshake.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn stream_chat(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken
    ) -> Result<TokenStream, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if self.stalled {
            std::future::pending::<()>().await;
        }

        match self.failure {
            Failure::TransportAlways => {
                return Err(ProviderError::Transport("connection refused".into()));
            }
            Failure::TransportOnce if call == 0 => {
                return Err(ProviderError::Transport("connection reset".into()));
            }
            Failure::Status(status) => {
                return Err(ProviderError::Status { status, body: "upstream said no".into() });
            }
            _ => {}
        }

        let (tx, rx) = mpsc::channel(8);
        let chunks = self.chunks.clone();
        let delay = self.delay;
        let hold_open = self.hold_open;
        tokio::spawn(async move {
            for chunk in chunks {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() || tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if hold_open {
                cancel.cancelled().await;
            }
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn get_model(&self) -> String {
        "scripted-model".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

/// History backend that is always down.
pub struct UnavailableStore;

#[async_trait]
impl HistoryStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<ScriptedProvider>,
}

impl TestApp {
    pub fn proxy(&self) -> &Arc<ChatProxy> {
        self.state.proxy()
    }
}

pub fn proxy_with(provider: Arc<ScriptedProvider>, backend: Arc<dyn HistoryStore>) -> ChatProxy {
    ChatProxy::new(
        provider,
        Arc::new(ConversationStore::new(backend, "chat:")),
        Arc::new(InMemoryCancellationRegistry::new()),
        PromptConfig::new("You are a helpful assistant.", "Search the web if it helps."),
        GenerationDefaults::default()
    )
}

pub fn app_with(
    provider: ScriptedProvider,
    backend: Arc<dyn HistoryStore>,
    max_requests: u32
) -> TestApp {
    let provider = Arc::new(provider);
    let proxy = Arc::new(proxy_with(Arc::clone(&provider), backend));
    let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60), max_requests));
    let state = AppState::new(proxy, limiter, CLIENT_HEADER);
    TestApp {
        router: build_router(state.clone()),
        state,
        provider,
    }
}

pub fn app(provider: ScriptedProvider) -> TestApp {
    app_with(provider, Arc::new(MemoryHistoryStore::new()), 100)
}
