//! Event filtering
//!
//! Runs only on deliveries whose signature has already been verified.

use serde::Serialize;

/// Prefix of a branch reference in a push payload
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Event kind the platform sends when a hook is first created
pub const PING_EVENT: &str = "ping";

/// What to do with a verified delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FilterDecision {
    /// Push to a tracked branch
    Deploy { branch: String },

    /// Connectivity check, answered without deploying
    Ping,

    /// Valid delivery that does not concern us
    Ignored { reason: String },
}

/// Accepts one event kind on a fixed set of branches
#[derive(Debug, Clone)]
pub struct EventFilter {
    event_kind: String,
    branches: Vec<String>,
}

impl EventFilter {
    pub fn new(event_kind: impl Into<String>, branches: Vec<String>) -> Self {
        Self {
            event_kind: event_kind.into(),
            branches,
        }
    }

    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    /// True only for the configured event kind on a configured branch
    ///
    /// `branch_ref` is the full reference from the payload; it must equal
    /// `refs/heads/<branch>` exactly. Case variants and bare names never match.
    pub fn should_deploy(&self, event_kind: &str, branch_ref: &str) -> bool {
        event_kind == self.event_kind && self.match_branch(branch_ref).is_some()
    }

    pub fn decide(&self, event_kind: Option<&str>, branch_ref: Option<&str>) -> FilterDecision {
        let event_kind = event_kind.unwrap_or_default();

        if event_kind == PING_EVENT {
            return FilterDecision::Ping;
        }

        if event_kind != self.event_kind {
            return FilterDecision::Ignored {
                reason: format!("event type '{}' ignored", event_kind),
            };
        }

        let Some(branch_ref) = branch_ref else {
            return FilterDecision::Ignored {
                reason: "payload carries no ref".to_string(),
            };
        };

        match self.match_branch(branch_ref) {
            Some(branch) => FilterDecision::Deploy {
                branch: branch.to_string(),
            },
            None => FilterDecision::Ignored {
                reason: format!(
                    "push to {} ignored (tracking {})",
                    branch_ref,
                    self.branches.join(", ")
                ),
            },
        }
    }

    fn match_branch(&self, branch_ref: &str) -> Option<&str> {
        let name = branch_ref.strip_prefix(BRANCH_REF_PREFIX)?;
        self.branches
            .iter()
            .find(|branch| branch.as_str() == name)
            .map(String::as_str)
    }
}
