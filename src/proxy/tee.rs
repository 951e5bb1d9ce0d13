use crate::llm::chat::TokenStream;
use futures::StreamExt;
use log::{ debug, warn };
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Client-facing half of a tee.
pub type ClientView = UnboundedReceiverStream<String>;

/// What the internal half saw by the time the upstream finished or was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    pub content: String,
    pub chunks: usize,
    pub interrupted: bool,
    pub error: Option<String>,
}

/// Internal half of a tee. Nothing flows to the client view until [`Accumulator::drain`] runs.
pub struct Accumulator {
    upstream: TokenStream,
    client: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

/// Splits `upstream` into a view for the client and an accumulator that keeps a copy of every
/// chunk it forwards.
///
/// Chunks reach the client through an unbounded channel, so a slow client never stalls the
/// accumulator and a client that hangs up does not stop it either.
pub fn tee(upstream: TokenStream, cancel: CancellationToken) -> (ClientView, Accumulator) {
    let (tx, rx) = mpsc::unbounded_channel();
    let accumulator = Accumulator {
        upstream,
        client: tx,
        cancel,
    };
    (UnboundedReceiverStream::new(rx), accumulator)
}

impl Accumulator {
    pub async fn drain(mut self) -> Drained {
        let mut content = String::new();
        let mut chunks = 0;
        let mut interrupted = false;
        let mut error = None;
        let mut client_gone = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                next = self.upstream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    content.push_str(&chunk);
                    chunks += 1;
                    if self.client.send(chunk).is_err() && !client_gone {
                        client_gone = true;
                        debug!("Client disconnected after {} chunks, still draining", chunks);
                    }
                }
                Some(Err(e)) => {
                    warn!("Upstream stream failed after {} chunks: {}", chunks, e);
                    error = Some(e.to_string());
                    break;
                }
                None => {
                    // Providers end their stream when they see the abort, which can race
                    // ahead of the select above.
                    interrupted = self.cancel.is_cancelled();
                    break;
                }
            }
        }

        Drained {
            content,
            chunks,
            interrupted,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderError;
    use futures::stream;

    fn upstream(items: Vec<Result<&'static str, ProviderError>>) -> TokenStream {
        Box::pin(stream::iter(items.into_iter().map(|r| r.map(String::from))))
    }

    #[tokio::test]
    async fn client_sees_exactly_what_is_accumulated() {
        let (view, acc) = tee(upstream(vec![Ok("Hel"), Ok(""), Ok("lo"), Ok(" world")]), CancellationToken::new());
        let drained = acc.drain().await;
        let seen: Vec<String> = view.collect().await;

        assert_eq!(seen.concat(), drained.content);
        assert_eq!(drained.content, "Hello world");
        assert_eq!(drained.chunks, 3);
        assert!(!drained.interrupted);
    }

    #[tokio::test]
    async fn keeps_draining_after_client_hangs_up() {
        let (view, acc) = tee(upstream(vec![Ok("a"), Ok("b")]), CancellationToken::new());
        drop(view);
        let drained = acc.drain().await;
        assert_eq!(drained.content, "ab");
    }

    #[tokio::test]
    async fn stream_error_keeps_partial_content() {
        let items = vec![Ok("par"), Err(ProviderError::Stream("reset".into())), Ok("never")];
        let (_view, acc) = tee(upstream(items), CancellationToken::new());
        let drained = acc.drain().await;
        assert_eq!(drained.content, "par");
        assert!(!drained.interrupted);
        assert!(drained.error.is_some());
    }

    #[tokio::test]
    async fn abort_marks_interrupted_and_stops() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel::<Result<String, ProviderError>>();
        let (view, acc) = tee(Box::pin(UnboundedReceiverStream::new(rx)), cancel.clone());
        let task = tokio::spawn(acc.drain());

        tx.send(Ok("partial".into())).unwrap();
        let mut view = view;
        assert_eq!(view.next().await.as_deref(), Some("partial"));
        cancel.cancel();

        let drained = task.await.unwrap();
        assert!(drained.interrupted);
        assert_eq!(drained.content, "partial");
        assert_eq!(view.next().await, None);
    }
}
