//! Deploy orchestrator
//!
//! detect -> update -> restart, bounded by one deadline shared by every
//! external command of the run. A run holds the project root's [`RunLock`]
//! from start to finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{info_span, Instrument};

use crate::deploy::detector::{self, DeploymentMode};
use crate::deploy::fsm::{DeployEvent, DeployFsm};
use crate::deploy::git;
use crate::deploy::lock::RunLock;
use crate::deploy::restart::{self, RestartOutcome};
use crate::deploy::runner::{CommandRunner, ProcessRunner};
use crate::errors::{LockError, RestartError, UpdateError};
use crate::models::deployment::{DeployLog, DeploymentResult, DeploymentStatus};

/// Time allowed to clean the tree after the deadline cut a pull short
pub const RESTORE_GRACE: Duration = Duration::from_secs(30);

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct Options {
    /// Working tree every command runs in
    pub project_root: PathBuf,

    /// Branch candidates, in preference order
    pub branches: Vec<String>,

    /// Upper bound for a whole run
    pub timeout: Duration,

    pub git: git::Options,
    pub detector: detector::Options,
    pub restart: restart::Options,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            branches: vec!["main".to_string(), "master".to_string()],
            timeout: Duration::from_secs(300),
            git: git::Options::default(),
            detector: detector::Options::default(),
            restart: restart::Options::default(),
        }
    }
}

/// Runs deploys; holds no state between runs
pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    options: Options,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, options: Options) -> Self {
        Self { runner, options }
    }

    /// Orchestrator that spawns real processes in the project root
    pub fn for_host(options: Options) -> Self {
        let runner = ProcessRunner::new(options.project_root.clone(), options.timeout);
        Self::new(Arc::new(runner), options)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Take the project root's run lock without waiting
    pub fn try_lock(&self) -> Result<RunLock, LockError> {
        RunLock::try_acquire(&self.options.project_root)
    }

    /// Run one deploy to completion and report the outcome
    ///
    /// Fails with [`LockError::Held`] when another run, in this process or
    /// another one, is working on the same tree.
    pub async fn run(&self) -> Result<DeploymentResult, LockError> {
        let lock = self.try_lock()?;
        Ok(self.run_locked(lock).await)
    }

    /// Run one deploy under a lock the caller already took
    pub async fn run_locked(&self, lock: RunLock) -> DeploymentResult {
        let _lock = lock;
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("deploy", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: String) -> DeploymentResult {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.options.timeout;
        let runner = self.runner.as_ref();
        let options = &self.options;

        let mut log = DeployLog::new();
        let mut fsm = DeployFsm::new();

        log.info(format!(
            "Starting deploy in {}",
            options.project_root.display()
        ));

        let mode = match timeout_at(
            deadline,
            detector::detect(runner, &options.project_root, &options.detector),
        )
        .await
        {
            Ok(mode) => mode,
            Err(_) => {
                log.warn("Environment detection timed out, treating host as unmanaged");
                DeploymentMode::Unmanaged
            }
        };
        log.info(format!("Deployment mode: {}", mode));

        // Phase 1: source update
        let mut branch = None;
        let mut previous_revision = None;
        let mut revision = None;

        let update = match timeout_at(deadline, git::current_revision(runner)).await {
            Ok(Ok(previous)) => {
                let pull = git::update_from(runner, &previous, &options.branches, &options.git);
                let pulled = timeout_at(deadline, pull).await;
                match pulled {
                    Ok(pulled) => pulled,
                    Err(_) => {
                        // The dropped pull may have left a merge or a moved HEAD behind
                        log.warn("Source update timed out, restoring the working tree");
                        restore_after_timeout(runner, &previous, &mut log).await;
                        Err(UpdateError::TimedOut(options.timeout))
                    }
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(UpdateError::TimedOut(options.timeout)),
        };

        match update {
            Ok(pulled) => {
                if pulled.changed() {
                    log.info(format!(
                        "Updated {} from {} to {}",
                        pulled.branch,
                        pulled.previous.short(),
                        pulled.current.short()
                    ));
                } else {
                    log.info(format!(
                        "{} already at {}",
                        pulled.branch,
                        pulled.current.short()
                    ));
                }
                branch = Some(pulled.branch);
                previous_revision = Some(pulled.previous);
                revision = Some(pulled.current);
                transition(&mut fsm, DeployEvent::UpdateSucceeded, &mut log);
            }
            Err(e) => {
                log.error(format!("Code update failed: {}", e));
                log.info("Application left untouched, previous revision keeps serving");
                transition(&mut fsm, DeployEvent::UpdateFailed(e.to_string()), &mut log);
            }
        }

        // Phase 2: restart, only after a successful update
        if fsm.can_restart() {
            let restarted = timeout_at(deadline, restart::restart(runner, mode, &options.restart))
                .await
                .unwrap_or(Err(RestartError::TimedOut(options.timeout)));

            match restarted {
                Ok(RestartOutcome::Restarted) => {
                    log.info(format!("Application restarted via {}", mode));
                    transition(&mut fsm, DeployEvent::RestartSucceeded, &mut log);
                }
                Ok(RestartOutcome::ManualRestartRequired) => {
                    log.warn("Code updated but not restarted: no systemd unit or compose stack detected, restart manually");
                }
                Err(e) => {
                    log.error(format!("Restart failed: {}", e));
                    if let Some(diagnostics) = e.diagnostics() {
                        log.error(diagnostics);
                    }
                    log.warn("Source tree is ahead of the running application");
                    transition(&mut fsm, DeployEvent::RestartFailed(e.to_string()), &mut log);
                }
            }
        }

        let status = fsm.status().unwrap_or(DeploymentStatus::CodeUpdateFailed);
        match status {
            DeploymentStatus::Succeeded => log.info("Deploy succeeded"),
            DeploymentStatus::UpdatedNotRestarted => log.warn(format!("Deploy finished: {}", status)),
            _ => log.error(format!("Deploy finished: {}", status)),
        }

        DeploymentResult {
            run_id,
            status,
            mode,
            branch,
            previous_revision,
            revision,
            started_at,
            finished_at: Utc::now(),
            log: log.into_entries(),
        }
    }
}

async fn restore_after_timeout(
    runner: &dyn CommandRunner,
    previous: &git::RevisionId,
    log: &mut DeployLog,
) {
    match timeout(RESTORE_GRACE, git::ensure_restored(runner, previous)).await {
        Ok(Ok(())) => log.info(format!("Working tree restored to {}", previous.short())),
        Ok(Err(e)) => log.error(format!("Working tree could not be restored: {}", e)),
        Err(_) => log.error(format!(
            "Restoring the working tree to {} timed out after {:?}",
            previous.short(),
            RESTORE_GRACE
        )),
    }
}

fn transition(fsm: &mut DeployFsm, event: DeployEvent, log: &mut DeployLog) {
    if let Err(e) = fsm.process(event) {
        log.error(e);
    }
}
