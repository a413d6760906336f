//! Deploy engine tests against fake hosts

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use pushdeploy::deploy::detector::{self, DeploymentMode};
use pushdeploy::deploy::git;
use pushdeploy::deploy::orchestrator::{Options, Orchestrator};
use pushdeploy::deploy::restart;
use pushdeploy::deploy::runner::{CommandOutput, CommandRunner, ScriptedRunner};
use pushdeploy::errors::{LockError, RunnerError, UpdateError};
use pushdeploy::models::deployment::DeploymentStatus;

const OLD: &str = "0123456789abcdef0123456789abcdef01234567";
const NEW: &str = "fedcba9876543210fedcba9876543210fedcba98";

/// A working tree whose pulls always fail halfway, leaving a merge behind
struct BrokenPullRepo {
    head: Mutex<String>,
    merging: Mutex<bool>,
    /// How long a pull hangs after touching the tree
    stall: Duration,
}

impl BrokenPullRepo {
    fn new() -> Self {
        Self {
            head: Mutex::new(OLD.to_string()),
            merging: Mutex::new(false),
            stall: Duration::ZERO,
        }
    }

    fn stalling(stall: Duration) -> Self {
        Self {
            stall,
            ..Self::new()
        }
    }

    fn merging(&self) -> bool {
        *self.merging.lock().unwrap()
    }

    fn head(&self) -> String {
        self.head.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for BrokenPullRepo {
    async fn run(&self, argv: &[&str]) -> Result<CommandOutput, RunnerError> {
        let output = match argv {
            ["git", "rev-parse", "HEAD"] => CommandOutput::ok(self.head()),
            ["git", "pull", ..] => {
                *self.head.lock().unwrap() = NEW.to_string();
                *self.merging.lock().unwrap() = true;
                tokio::time::sleep(self.stall).await;
                CommandOutput::failed(1, "CONFLICT (content): Merge conflict in app.py")
            }
            ["git", "rev-parse", "-q", "--verify", "MERGE_HEAD"] => {
                if *self.merging.lock().unwrap() {
                    CommandOutput::ok(NEW)
                } else {
                    CommandOutput::failed(1, "")
                }
            }
            ["git", "merge", "--abort"] => {
                *self.merging.lock().unwrap() = false;
                CommandOutput::ok("")
            }
            ["git", "reset", "--merge", revision] => {
                *self.head.lock().unwrap() = revision.to_string();
                CommandOutput::ok("")
            }
            _ => CommandOutput::failed(127, "unexpected command"),
        };
        Ok(output)
    }
}

fn branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

#[tokio::test]
async fn test_failed_update_restores_revision() {
    let repo = BrokenPullRepo::new();
    let before = repo.head();

    let err = assert_err!(git::update(&repo, &branches(), &git::Options::default()).await);
    match err {
        UpdateError::AllBranchesFailed { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert!(attempts[0].starts_with("main:"));
            assert!(attempts[1].starts_with("master:"));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert_eq!(repo.head(), before);
    assert!(!repo.merging());
}

#[tokio::test]
async fn test_pull_cut_off_by_deadline_restores_revision() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(BrokenPullRepo::stalling(Duration::from_secs(60)));

    let options = Options {
        project_root: dir.path().to_path_buf(),
        timeout: Duration::from_millis(200),
        ..Options::default()
    };
    let result = assert_ok!(Orchestrator::new(repo.clone(), options).run().await);

    assert_eq!(result.status, DeploymentStatus::CodeUpdateFailed);
    assert_eq!(repo.head(), OLD);
    assert!(!repo.merging());
    assert!(result
        .log
        .iter()
        .any(|entry| entry.message.contains("restored to")));
}

#[tokio::test]
async fn test_update_falls_back_to_second_branch() {
    let runner = ScriptedRunner::new();
    runner.push("git rev-parse HEAD", CommandOutput::ok(OLD));
    runner.push(
        "git pull --ff-only origin main",
        CommandOutput::failed(1, "fatal: couldn't find remote ref main"),
    );
    runner.push(
        "git rev-parse -q --verify MERGE_HEAD",
        CommandOutput::failed(1, ""),
    );
    runner.push("git rev-parse HEAD", CommandOutput::ok(OLD));
    runner.push("git rev-parse HEAD", CommandOutput::ok(NEW));

    let pulled = assert_ok!(git::update(&runner, &branches(), &git::Options::default()).await);
    assert_eq!(pulled.branch, "master");
    assert!(pulled.changed());
    assert_eq!(runner.count("git pull"), 2);
}

#[tokio::test]
async fn test_two_orchestrators_on_one_tree_run_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .with_delay(Duration::from_millis(50))
            .with_responder(|argv| match argv {
                ["git", "rev-parse", "HEAD"] => Some(Ok(CommandOutput::ok(OLD))),
                _ => None,
            }),
    );
    let options = Options {
        project_root: dir.path().to_path_buf(),
        ..Options::default()
    };
    let webhook = Orchestrator::new(runner.clone(), options.clone());
    let manual = Orchestrator::new(runner.clone(), options);

    let (first, second) = tokio::join!(webhook.run(), manual.run());

    let finished = assert_ok!(first);
    assert_eq!(finished.status, DeploymentStatus::UpdatedNotRestarted);
    assert!(matches!(assert_err!(second), LockError::Held { .. }));
    assert_eq!(runner.count("git pull"), 1);

    // Released once the first run is done
    assert_ok!(manual.run().await);
    assert_eq!(runner.count("git pull"), 2);
}

fn write_compose(root: &Path) {
    std::fs::write(root.join("docker-compose.yml"), "services:\n  app:\n    build: .\n").unwrap();
}

fn unit_options() -> detector::Options {
    detector::Options {
        unit: Some("app".to_string()),
        ..detector::Options::default()
    }
}

#[tokio::test]
async fn test_active_unit_wins_over_compose_stack() {
    let dir = tempfile::tempdir().unwrap();
    write_compose(dir.path());
    let runner = ScriptedRunner::new().with_responder(|argv| match argv {
        ["systemctl", "is-active", "app"] => Some(Ok(CommandOutput::ok("active\n"))),
        ["docker", "--version"] => Some(Ok(CommandOutput::ok("Docker version 27.0.3"))),
        _ => None,
    });

    let first = detector::detect(&runner, dir.path(), &unit_options()).await;
    let second = detector::detect(&runner, dir.path(), &unit_options()).await;
    assert_eq!(first, DeploymentMode::ProcessSupervised);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_compose_without_engine_is_unmanaged() {
    let dir = tempfile::tempdir().unwrap();
    write_compose(dir.path());
    let runner = ScriptedRunner::new().with_responder(|argv| match argv {
        ["docker", "--version"] => Some(Err(RunnerError::Spawn {
            program: "docker".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })),
        _ => None,
    });

    let mode = detector::detect(&runner, dir.path(), &detector::Options::default()).await;
    assert_eq!(mode, DeploymentMode::Unmanaged);
}

#[tokio::test]
async fn test_compose_stack_redeploy() {
    let dir = tempfile::tempdir().unwrap();
    write_compose(dir.path());
    let runner = Arc::new(ScriptedRunner::new());
    runner.push("git rev-parse HEAD", CommandOutput::ok(OLD));
    runner.push("git rev-parse HEAD", CommandOutput::ok(NEW));

    let options = Options {
        project_root: dir.path().to_path_buf(),
        ..Options::default()
    };
    let result = Orchestrator::new(runner.clone(), options).run().await.unwrap();

    assert_eq!(result.mode, DeploymentMode::ContainerOrchestrated);
    assert_eq!(result.status, DeploymentStatus::Succeeded);

    let calls = runner.calls();
    let down = calls
        .iter()
        .position(|c| c == "docker compose -f docker-compose.yml down")
        .unwrap();
    let up = calls
        .iter()
        .position(|c| c == "docker compose -f docker-compose.yml up -d")
        .unwrap();
    assert!(down < up);
}

#[tokio::test]
async fn test_unit_never_active_reports_restart_failed() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().with_responder(|argv| match argv {
        ["systemctl", "is-active", "app"] => Some(Ok(CommandOutput::failed(3, "failed"))),
        ["journalctl", ..] => Some(Ok(CommandOutput::ok("app.py: ImportError"))),
        _ => None,
    }));
    // Active at detection time, then never again after the restart
    runner.push("systemctl is-active app", CommandOutput::ok("active"));
    runner.push("git rev-parse HEAD", CommandOutput::ok(OLD));
    runner.push("git rev-parse HEAD", CommandOutput::ok(NEW));

    let options = Options {
        project_root: dir.path().to_path_buf(),
        detector: unit_options(),
        restart: restart::Options {
            unit: Some("app".to_string()),
            retries: 3,
            poll_interval: Duration::ZERO,
            ..restart::Options::default()
        },
        ..Options::default()
    };
    let result = Orchestrator::new(runner.clone(), options).run().await.unwrap();

    assert_eq!(result.status, DeploymentStatus::RestartFailed);
    assert_eq!(result.exit_code(), 2);
    assert_eq!(runner.count("systemctl restart app"), 1);
    assert!(result
        .log
        .iter()
        .any(|entry| entry.message.contains("ImportError")));
}
