//! Deploy worker
//!
//! Runs orchestrator invocations as isolated tasks, at most one at a time.
//! A trigger that arrives while a deploy holds the lock is rejected as busy
//! rather than queued. "Holds the lock" covers both the in-process mutex and
//! the tree's run lock, which a manual deploy in another process may own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::deploy::orchestrator::Orchestrator;
use crate::errors::LockError;
use crate::models::deployment::DeploymentResult;

/// Why a deploy was requested
#[derive(Debug, Clone)]
pub struct DeployTrigger {
    pub delivery_id: String,
    pub branch: String,
    pub pusher: String,
}

/// Outcome of a dispatch attempt
pub enum Dispatch {
    /// The deploy task is running; its handle yields the result
    Started(JoinHandle<DeploymentResult>),

    /// Another deploy holds the lock
    Busy,

    /// The run lock could not be opened at all
    Failed(LockError),
}

/// Single-flight deploy dispatcher
pub struct Deployer {
    orchestrator: Arc<Orchestrator>,
    lock: Arc<Mutex<()>>,
}

impl Deployer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Start a deploy unless one is already in flight
    ///
    /// Both locks are taken before the task is spawned and released when the
    /// task finishes, panics included.
    pub fn try_dispatch(&self, trigger: DeployTrigger) -> Dispatch {
        let guard = match self.lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    "Deploy already in progress, rejecting delivery {}",
                    trigger.delivery_id
                );
                return Dispatch::Busy;
            }
        };

        let run_lock = match self.orchestrator.try_lock() {
            Ok(run_lock) => run_lock,
            Err(LockError::Held { path }) => {
                warn!(
                    "Deploy running in another process ({}), rejecting delivery {}",
                    path.display(),
                    trigger.delivery_id
                );
                return Dispatch::Busy;
            }
            Err(e) => {
                error!("Cannot start deploy for delivery {}: {}", trigger.delivery_id, e);
                return Dispatch::Failed(e);
            }
        };

        info!(
            "Starting deploy for push to {} by {} (delivery {})",
            trigger.branch, trigger.pusher, trigger.delivery_id
        );

        let orchestrator = self.orchestrator.clone();
        let span = info_span!("delivery", id = %trigger.delivery_id);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                let result = orchestrator.run_locked(run_lock).await;
                if result.status.is_failure() {
                    error!("Deploy {} finished: {}", result.run_id, result.status);
                } else {
                    info!("Deploy {} finished: {}", result.run_id, result.status);
                }
                result
            }
            .instrument(span),
        );

        Dispatch::Started(handle)
    }

    /// Wait for an in-flight deploy to finish, up to `max_wait`
    pub async fn wait_idle(&self, max_wait: Duration) -> bool {
        match tokio::time::timeout(max_wait, self.lock.lock()).await {
            Ok(_guard) => true,
            Err(_) => {
                warn!("Deploy still running after {:?}", max_wait);
                false
            }
        }
    }
}
