//! Streaming HTTP transport for the generate endpoint.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use pulse_core::{BackendConfig, ChunkStream, GenerateRequest, Transport, TransportError};

/// POSTs a [`GenerateRequest`] and streams the response body as text.
///
/// Dropping the returned stream aborts the body read and closes the
/// connection.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: join_url(&config.base_url, &config.generate_path),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &GenerateRequest) -> Result<ChunkStream, TransportError> {
        debug!(
            "Sending streaming request to {} (refine: {})",
            self.endpoint,
            request.is_refine()
        );

        let send = self
            .client
            .post(&self.endpoint)
            .header("Accept", "text/event-stream, text/plain")
            .json(request)
            .send();

        let response = match tokio::time::timeout(self.request_timeout, send).await {
            Ok(result) => result.map_err(map_reqwest_error)?,
            Err(_) => {
                return Err(TransportError::Timeout(format!(
                    "no response from {} within {}s",
                    self.endpoint,
                    self.request_timeout.as_secs()
                )))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Backend returned {}: {}", status, body);
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(forward_body(stream, tx));

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Pump the response body into `tx` until it ends, fails, or the receiver
/// goes away.
async fn forward_body(
    mut stream: impl futures_util::Stream<Item = reqwest::Result<Bytes>> + Unpin,
    tx: mpsc::Sender<Result<String, TransportError>>,
) {
    let mut utf8 = Utf8Carry::default();
    let mut bytes_received = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("Receiver dropped, aborting response body");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                bytes_received += chunk.len();
                let text = utf8.push(&chunk);
                if text.is_empty() {
                    continue;
                }
                if tx.send(Ok(text)).await.is_err() {
                    debug!("Receiver dropped, stopping stream");
                    return;
                }
            }
            Some(Err(e)) => {
                error!("Stream error after {} bytes: {}", bytes_received, e);
                let _ = tx.send(Err(map_reqwest_error(e))).await;
                return;
            }
            None => {
                if let Some(tail) = utf8.finish() {
                    let _ = tx.send(Ok(tail)).await;
                }
                debug!("Response body complete ({} bytes)", bytes_received);
                return;
            }
        }
    }
}

/// Decodes UTF-8 across chunk boundaries. A multi-byte character split
/// between two chunks is held until its remaining bytes arrive; invalid
/// sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            warn!("Replacing {} invalid UTF-8 byte(s) in response body", len);
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Bytes left at end of body; an incomplete character is replaced.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(tail)
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        TransportError::Network(e.to_string())
    } else if let Some(status) = e.status() {
        TransportError::Http {
            status: status.as_u16(),
            body: e.to_string(),
        }
    } else {
        TransportError::Other(e.to_string())
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_split_character_is_held() {
        let bytes = "café ☕".as_bytes();
        let mut carry = Utf8Carry::default();
        // 'é' is two bytes starting at index 3
        assert_eq!(carry.push(&bytes[..4]), "caf");
        assert_eq!(carry.push(&bytes[4..8]), "é ");
        assert_eq!(carry.push(&bytes[8..]), "☕");
        assert!(carry.finish().is_none());
    }

    #[test]
    fn utf8_invalid_byte_is_replaced() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(b"ok\xffgo"), "ok\u{FFFD}go");
    }

    #[test]
    fn utf8_truncated_tail_is_flushed_lossy() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&"é".as_bytes()[..1]), "");
        assert_eq!(carry.finish().as_deref(), Some("\u{FFFD}"));
    }

    #[test]
    fn urls_are_joined_with_one_slash() {
        assert_eq!(join_url("http://h/api/", "/chat"), "http://h/api/chat");
        assert_eq!(join_url("http://h/api", "chat"), "http://h/api/chat");
        assert_eq!(join_url("http://h/api", ""), "http://h/api");
    }

    #[test]
    fn endpoint_comes_from_config() {
        let config = BackendConfig {
            base_url: "http://localhost:9999/api/".to_string(),
            ..BackendConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:9999/api/chat");
        assert_eq!(transport.name(), "http");
    }
}
