pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::debug;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType, ProviderError };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Upper bound on how much of a provider's error body is kept in [`ProviderError::Status`].
pub const MAX_ERROR_BODY_BYTES: usize = 4096;

/// Text deltas as the provider produces them.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Sends the request and resolves once the provider has accepted it, yielding the token
    /// stream. Non-success statuses are reported here, never through the stream. The token
    /// aborts the handshake and stops the stream once triggered.
    async fn stream_chat(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken
    ) -> Result<TokenStream, ProviderError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    let client: Arc<dyn ModelProvider> = match config.llm_type {
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// What a provider-specific parser made of one line of the wire stream.
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    Token(String),
    Done,
    Error(String),
    Skip,
}

/// Reassembles newline-delimited records from arbitrarily split network chunks. Bytes are
/// held back until a full line is present, so multi-byte characters split across chunks
/// decode intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_string();
            lines.push(line);
        }
        lines
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// Sends a streaming request, racing the handshake against cancellation, and checks the
/// status before anything is handed to the caller.
pub(crate) async fn send_streaming(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken
) -> Result<reqwest::Response, ProviderError> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        sent = request.send() => sent?,
    };

    let status = response.status();
    if !status.is_success() {
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            body = read_error_body(response) => body,
        };
        return Err(ProviderError::Status { status: status.as_u16(), body });
    }
    if status == reqwest::StatusCode::NO_CONTENT || response.content_length() == Some(0) {
        return Err(ProviderError::EmptyBody);
    }
    Ok(response)
}

/// Reads at most [`MAX_ERROR_BODY_BYTES`] of an error response. A body that fails midway keeps
/// whatever arrived before the failure.
async fn read_error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while body.len() < MAX_ERROR_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                debug!("Error body read failed: {}", e);
                break;
            }
        }
    }
    body.truncate(MAX_ERROR_BODY_BYTES);
    String::from_utf8_lossy(&body).into_owned()
}

/// Pumps the response body through `parse_line` on a background task. The task stops on
/// cancellation, on a terminal line, or once the receiving side is dropped, and dropping the
/// response closes the upstream connection.
pub(crate) fn stream_lines(
    response: reqwest::Response,
    cancel: CancellationToken,
    parse_line: fn(&str) -> LineEvent
) -> TokenStream {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut bytes = response.bytes_stream();
        let mut buffer = LineBuffer::default();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Provider stream cancelled, closing upstream");
                    return;
                }
                chunk = bytes.next() => chunk,
            };

            let (lines, eof) = match chunk {
                Some(Ok(buf)) => (buffer.push(&buf), false),
                Some(Err(e)) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
                None => (buffer.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    LineEvent::Token(token) => {
                        if tx.send(Ok(token)).await.is_err() {
                            return;
                        }
                    }
                    LineEvent::Done => {
                        return;
                    }
                    LineEvent::Error(message) => {
                        let _ = tx.send(Err(ProviderError::Stream(message))).await;
                        return;
                    }
                    LineEvent::Skip => {}
                }
            }

            if eof {
                return;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
