//! Git source updater

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::deploy::runner::CommandRunner;
use crate::errors::UpdateError;

/// Updater options
#[derive(Debug, Clone)]
pub struct Options {
    /// Remote to pull from
    pub remote: String,

    /// Refuse merges; a diverged branch fails instead of creating a merge commit
    pub ff_only: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            ff_only: true,
        }
    }
}

/// A commit id as printed by `git rev-parse HEAD`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledRevision {
    pub branch: String,
    pub previous: RevisionId,
    pub current: RevisionId,
}

impl PulledRevision {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

pub async fn current_revision(runner: &dyn CommandRunner) -> Result<RevisionId, UpdateError> {
    let output = runner.run(&["git", "rev-parse", "HEAD"]).await?;
    let id = output.stdout.trim();
    if !output.success() || id.is_empty() {
        return Err(UpdateError::Revision(output.summary()));
    }
    Ok(RevisionId::new(id))
}

/// Pull the first branch that succeeds, in preference order
///
/// The runner's working directory is the project root. A failed attempt is
/// checked for leftovers (an in-progress merge or a moved `HEAD`) and cleaned
/// up before the next candidate is tried, so a total failure leaves the tree
/// at the revision it started from.
pub async fn update(
    runner: &dyn CommandRunner,
    branches: &[String],
    options: &Options,
) -> Result<PulledRevision, UpdateError> {
    if branches.is_empty() {
        return Err(UpdateError::NoBranches);
    }

    let previous = current_revision(runner).await?;
    update_from(runner, &previous, branches, options).await
}

/// Same as [`update`], starting from a revision the caller already read
///
/// Callers that may abandon the pull midway keep `previous` so they can hand
/// it to [`ensure_restored`] afterwards.
pub async fn update_from(
    runner: &dyn CommandRunner,
    previous: &RevisionId,
    branches: &[String],
    options: &Options,
) -> Result<PulledRevision, UpdateError> {
    if branches.is_empty() {
        return Err(UpdateError::NoBranches);
    }
    debug!("Current revision: {}", previous);

    let mut attempts = Vec::with_capacity(branches.len());
    for branch in branches {
        info!("Pulling {} from {}...", branch, options.remote);

        let mut argv = vec!["git", "pull"];
        if options.ff_only {
            argv.push("--ff-only");
        }
        argv.push(options.remote.as_str());
        argv.push(branch.as_str());

        match runner.run(&argv).await {
            Ok(output) if output.success() => match current_revision(runner).await {
                Ok(current) => {
                    info!(
                        "Pulled {}: {} -> {}",
                        branch,
                        previous.short(),
                        current.short()
                    );
                    return Ok(PulledRevision {
                        branch: branch.clone(),
                        previous: previous.clone(),
                        current,
                    });
                }
                Err(e) => {
                    // HEAD is unreadable, so it cannot be compared; reset unconditionally
                    warn!("Pulled {} but the new revision is unreadable: {}", branch, e);
                    attempts.push(format!("{}: {}", branch, e));
                    reset_to(runner, previous).await?;
                    continue;
                }
            },
            Ok(output) => {
                warn!("git pull {} failed: {}", branch, output.summary());
                attempts.push(format!("{}: {}", branch, output.summary()));
            }
            Err(e) => {
                warn!("git pull {} could not run: {}", branch, e);
                attempts.push(format!("{}: {}", branch, e));
            }
        }

        ensure_restored(runner, previous).await?;
    }

    Err(UpdateError::AllBranchesFailed { attempts })
}

/// Put the tree back to `expected` if a failed pull left anything behind
pub async fn ensure_restored(
    runner: &dyn CommandRunner,
    expected: &RevisionId,
) -> Result<(), UpdateError> {
    let merge_head = runner
        .run(&["git", "rev-parse", "-q", "--verify", "MERGE_HEAD"])
        .await?;
    if merge_head.success() {
        warn!("Failed pull left a merge in progress, aborting it");
        let abort = runner.run(&["git", "merge", "--abort"]).await?;
        if !abort.success() {
            return Err(UpdateError::DirtyAfterFailure {
                revision: expected.to_string(),
                detail: abort.summary(),
            });
        }
    }

    let head = current_revision(runner).await?;
    if &head != expected {
        warn!("HEAD moved to {} after a failed pull, resetting", head.short());
        reset_to(runner, expected).await?;
    }

    Ok(())
}

async fn reset_to(runner: &dyn CommandRunner, revision: &RevisionId) -> Result<(), UpdateError> {
    let reset = runner
        .run(&["git", "reset", "--merge", revision.as_str()])
        .await?;
    if !reset.success() {
        return Err(UpdateError::DirtyAfterFailure {
            revision: revision.to_string(),
            detail: reset.summary(),
        });
    }
    Ok(())
}
