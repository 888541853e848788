use crate::session::SessionView;

/// Receives every published view of a session, in order.
///
/// Called while the session's state lock is held, so implementations must
/// not call back into the session handle.
pub trait SessionObserver: Send + Sync {
    fn on_update(&self, view: &SessionView);
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionView) + Send + Sync,
{
    fn on_update(&self, view: &SessionView) {
        self(view)
    }
}

/// Observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_update(&self, _view: &SessionView) {}
}
