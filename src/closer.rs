//! Shutdown registry.
//!
//! Resources that must be released when the service stops register a close
//! action. [`Closer::close`] runs the actions in reverse registration order
//! (last opened, first closed), each bounded by the closer's timeout.
//!
//! ```rust
//! # async fn demo() {
//! use rivet::closer;
//!
//! closer::global().register("flush metrics", || Ok::<(), std::io::Error>(()));
//! closer::global().register_async("drain queue", || async { Ok::<(), std::io::Error>(()) });
//!
//! // [`Server::serve`](rivet::Server::serve) does this after draining connections.
//! closer::global().close().await.unwrap();
//! # }
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::errors::BoxError;

/// Per-action timeout unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type ActionFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'static>>;

struct Action {
    name: Cow<'static, str>,
    run: Box<dyn FnOnce() -> ActionFuture + Send + 'static>,
}

struct State {
    actions: Vec<Action>,
    timeout: Duration,
    closed: bool,
}

/// A LIFO registry of close actions.
pub struct Closer {
    state: Mutex<State>,
    closing: watch::Sender<bool>,
}

/// The process-wide closer used by [`Server`](crate::Server).
pub fn global() -> &'static Closer {
    static GLOBAL: LazyLock<Closer> = LazyLock::new(Closer::new);
    &GLOBAL
}

impl Closer {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State { actions: Vec::new(), timeout, closed: false }),
            closing: watch::Sender::new(false),
        }
    }

    /// Changes how long each action may run.
    pub fn set_timeout(&self, timeout: Duration) {
        self.lock().timeout = timeout;
    }

    /// Registers a blocking close action. It runs on tokio's blocking pool.
    pub fn register<F, E>(&self, name: impl Into<Cow<'static, str>>, action: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.push(name.into(), Box::new(move || -> ActionFuture {
            Box::pin(async move {
                match tokio::task::spawn_blocking(action).await {
                    Ok(res) => res.map_err(Into::into),
                    Err(join) => Err(join.into()),
                }
            })
        }));
    }

    pub fn register_async<F, Fut, E>(&self, name: impl Into<Cow<'static, str>>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.push(name.into(), Box::new(move || -> ActionFuture {
            Box::pin(async move { action().await.map_err(Into::into) })
        }));
    }

    fn push(&self, name: Cow<'static, str>, run: Box<dyn FnOnce() -> ActionFuture + Send + 'static>) {
        let mut state = self.lock();
        if state.closed {
            warn!(action = %name, "close action registered after close, it will never run");
            return;
        }
        state.actions.push(Action { name, run });
    }

    /// Flips to `true` when [`close`](Self::close) begins.
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Runs every registered action, newest first.
    ///
    /// Failures and timeouts do not stop the remaining actions; they are
    /// collected into the returned [`CloseError`]. Only the first call does
    /// any work, later calls return `Ok(())` immediately.
    pub async fn close(&self) -> Result<(), CloseError> {
        let (actions, timeout) = {
            let mut state = self.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            (std::mem::take(&mut state.actions), state.timeout)
        };
        self.closing.send_replace(true);

        let mut failures = Vec::new();
        for action in actions.into_iter().rev() {
            let Action { name, run } = action;
            let failure = match tokio::time::timeout(timeout, run()).await {
                Ok(Ok(())) => {
                    debug!(action = %name, "closed");
                    continue;
                }
                Ok(Err(err)) => ActionError::Failed(err),
                Err(_) => ActionError::TimedOut(timeout),
            };
            error!(action = %name, error = %failure, "close action failed");
            failures.push(CloseFailure { action: name, error: failure });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseError { failures })
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Closer {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Closer")
            .field("actions", &state.actions.iter().map(|a| &a.name).collect::<Vec<_>>())
            .field("timeout", &state.timeout)
            .field("closed", &state.closed)
            .finish()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// One or more close actions failed.
#[derive(Debug, thiserror::Error)]
#[error("{} close action(s) failed: {}", .failures.len(), summary(.failures))]
pub struct CloseError {
    pub failures: Vec<CloseFailure>,
}

#[derive(Debug)]
pub struct CloseFailure {
    pub action: Cow<'static, str>,
    pub error: ActionError,
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("{0}")]
    Failed(#[source] BoxError),
}

fn summary(failures: &[CloseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("'{}': {}", f.action, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
