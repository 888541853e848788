//! Transport seam between the session controller and the backend.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::error_handling::TransportError;
use crate::request::GenerateRequest;

/// Ordered text deliveries of one response body. Dropping the stream aborts
/// the underlying connection.
pub type ChunkStream = ReceiverStream<Result<String, TransportError>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one response stream for `request`.
    async fn open(&self, request: &GenerateRequest) -> Result<ChunkStream, TransportError>;

    fn name(&self) -> &str;
}

/// One step of a [`ScriptedTransport`] response.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Chunk(String),
    Delay(Duration),
    Fail(TransportError),
    /// Keep the stream open without sending anything until it is dropped.
    Hang,
}

/// In-memory transport replaying a fixed script, for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    steps: Vec<ScriptStep>,
    open_error: Option<TransportError>,
    requests: Arc<Mutex<Vec<GenerateRequest>>>,
}

impl ScriptedTransport {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_steps(chunks.into_iter().map(|c| ScriptStep::Chunk(c.into())).collect())
    }

    pub fn from_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// A transport whose `open` always fails with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::default()
        }
    }

    /// Requests seen by `open`, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: &GenerateRequest) -> Result<ChunkStream, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }

        let steps = self.steps.clone();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for step in steps {
                match step {
                    ScriptStep::Chunk(chunk) => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            debug!("Scripted stream receiver dropped");
                            return;
                        }
                    }
                    ScriptStep::Delay(delay) => tokio::time::sleep(delay).await,
                    ScriptStep::Fail(error) => {
                        let _ = tx.send(Err(error)).await;
                        return;
                    }
                    ScriptStep::Hang => {
                        tx.closed().await;
                        return;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
