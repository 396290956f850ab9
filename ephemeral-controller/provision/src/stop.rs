//! External cancellation of an invocation.

use std::sync::Arc;
use tokio::sync::watch;

/// Requests that an invocation stop.
#[derive(Clone, Debug)]
pub struct Stop(Arc<watch::Sender<Option<String>>>);

/// Observed by an invocation to learn that it should stop.
#[derive(Clone, Debug)]
pub struct Stopped(watch::Receiver<Option<String>>);

pub fn channel() -> (Stop, Stopped) {
    let (tx, rx) = watch::channel(None);
    (Stop(Arc::new(tx)), Stopped(rx))
}

// === impl Stop ===

impl Stop {
    /// Only the first cause is retained.
    pub fn stop(&self, cause: impl Into<String>) {
        let cause = cause.into();
        self.0.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        });
    }
}

// === impl Stopped ===

impl Stopped {
    /// A signal that never fires.
    pub fn never() -> Self {
        channel().1
    }

    pub fn is_stopped(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Completes with the stop cause. Pends forever if every [`Stop`] handle
    /// is dropped without stopping.
    pub async fn stopped(&mut self) -> String {
        match self.0.wait_for(Option::is_some).await {
            Ok(cause) => (*cause).clone().unwrap_or_default(),
            Err(_) => futures::future::pending().await,
        }
    }
}
