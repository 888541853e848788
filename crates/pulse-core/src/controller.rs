//! Session controller: drives one transport stream per request through the
//! frame decoder and publishes merged session views.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error_handling::{FailureKind, SessionError};
use crate::event::parse;
use crate::frame::FrameDecoder;
use crate::observer::SessionObserver;
use crate::request::GenerateRequest;
use crate::session::{SessionState, SessionView};
use crate::transport::Transport;

/// State shared between a handle and its driver task.
struct SessionShared {
    state: Mutex<SessionState>,
    views: watch::Sender<SessionView>,
    observers: Vec<Arc<dyn SessionObserver>>,
    cancel: CancellationToken,
}

impl SessionShared {
    /// Run `f` under the state lock and publish a view if it changed
    /// anything. Publishing happens under the same lock so that no view can
    /// be observed after a cancellation view.
    fn mutate(&self, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !f(&mut state) {
            return false;
        }
        let view = state.view();
        for observer in &self.observers {
            observer.on_update(&view);
        }
        self.views.send_replace(view);
        true
    }

    fn is_terminal(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_terminal()
    }
}

/// Handle to one submitted request.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("terminal", &self.is_terminal())
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest published view.
    pub fn view(&self) -> SessionView {
        self.shared.views.borrow().clone()
    }

    /// Receiver that yields every newly published view.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.shared.views.subscribe()
    }

    pub fn is_terminal(&self) -> bool {
        self.shared.is_terminal()
    }

    /// Abort the stream and mark the session cancelled. Returns `false` if
    /// the session had already ended.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.mutate(SessionState::abort);
        self.shared.cancel.cancel();
        if cancelled {
            info!(request_id = %self.id, "Session cancelled");
        }
        cancelled
    }

    /// Wait until the session reaches a terminal state.
    pub async fn finished(&self) -> SessionView {
        let mut views = self.watch();
        loop {
            {
                let view = views.borrow_and_update();
                if view.is_terminal() {
                    return view.clone();
                }
            }
            if views.changed().await.is_err() {
                return self.view();
            }
        }
    }
}

/// Owns the transport and at most one in-flight request.
pub struct SessionController<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    observers: Vec<Arc<dyn SessionObserver>>,
    active: Option<SessionHandle>,
}

impl<T: Transport + 'static> SessionController<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            observers: Vec::new(),
            active: None,
        }
    }

    /// Register an observer for every session submitted from now on.
    pub fn subscribe(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn active(&self) -> Option<&SessionHandle> {
        self.active.as_ref().filter(|handle| !handle.is_terminal())
    }

    /// Start streaming `request`. Rejected while another request is still
    /// streaming; cancel it first or use [`Self::cancel_and_submit`].
    pub fn submit(&mut self, request: GenerateRequest) -> Result<SessionHandle, SessionError> {
        if let Some(active) = self.active() {
            return Err(SessionError::RequestInFlight {
                request_id: active.id(),
            });
        }

        let id = Uuid::new_v4();
        let state = SessionState::new(id, request.thread_id.clone());
        let (views, _) = watch::channel(state.view());
        let shared = Arc::new(SessionShared {
            state: Mutex::new(state),
            views,
            observers: self.observers.clone(),
            cancel: CancellationToken::new(),
        });

        info!(
            request_id = %id,
            transport = self.transport.name(),
            refine = request.is_refine(),
            "Submitting request"
        );

        tokio::spawn(drive(
            Arc::clone(&self.transport),
            request,
            Arc::clone(&shared),
            self.config.clone(),
        ));

        let handle = SessionHandle { id, shared };
        self.active = Some(handle.clone());
        Ok(handle)
    }

    pub fn cancel(&self, handle: &SessionHandle) -> bool {
        handle.cancel()
    }

    /// Explicit user-triggered replacement of the in-flight request.
    pub fn cancel_and_submit(
        &mut self,
        request: GenerateRequest,
    ) -> Result<SessionHandle, SessionError> {
        if let Some(active) = self.active.take() {
            active.cancel();
        }
        self.submit(request)
    }
}

/// Driver task for one session. Returns when the session is terminal.
async fn drive<T: Transport>(
    transport: Arc<T>,
    request: GenerateRequest,
    shared: Arc<SessionShared>,
    config: SessionConfig,
) {
    let opened = tokio::select! {
        _ = shared.cancel.cancelled() => return,
        opened = transport.open(&request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open stream: {}", e);
            shared.mutate(|s| s.fail_transport(e.kind(), e.to_string()));
            return;
        }
    };

    let mut decoder = FrameDecoder::with_max_carry(config.max_carry_bytes);
    let idle = config.inactivity_timeout();
    let mut chunks_received = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                debug!("Cancellation observed, dropping stream");
                return;
            }
            next = tokio::time::timeout(idle, stream.next()) => next,
        };

        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                error!("Stream error after {} chunks: {}", chunks_received, e);
                shared.mutate(|s| s.fail_transport(e.kind(), e.to_string()));
                return;
            }
            Ok(None) => {
                for frame in decoder.finish() {
                    if apply_frame(&shared, frame) {
                        return;
                    }
                }
                warn!(
                    "Stream closed after {} chunks without a terminal frame",
                    chunks_received
                );
                shared.mutate(|s| {
                    s.fail_transport(
                        FailureKind::ConnectionClosed,
                        "stream closed before the response completed",
                    )
                });
                return;
            }
            Err(_) => {
                error!("No data for {}s, giving up", idle.as_secs());
                shared.mutate(|s| {
                    s.fail_transport(
                        FailureKind::Timeout,
                        format!("no data received for {}s", idle.as_secs()),
                    )
                });
                return;
            }
        };

        chunks_received += 1;
        debug!(chunk = chunks_received, bytes = chunk.len(), "Chunk received");

        for frame in decoder.push(&chunk) {
            if apply_frame(&shared, frame) {
                return;
            }
        }
    }
}

/// Parse and apply one frame. Returns `true` once the session is terminal.
fn apply_frame(shared: &SessionShared, frame: crate::frame::LogicalFrame) -> bool {
    if shared.cancel.is_cancelled() {
        return true;
    }
    let event = parse(frame);
    let terminal = event.is_terminal();
    shared.mutate(|s| s.apply(event));
    terminal || shared.is_terminal()
}
