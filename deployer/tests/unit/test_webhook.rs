//! End-to-end webhook tests against the router with a scripted host

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use pushdeploy::app::options::AppOptions;
use pushdeploy::app::state::AppState;
use pushdeploy::deploy::lock::RunLock;
use pushdeploy::deploy::orchestrator::Orchestrator;
use pushdeploy::deploy::runner::{CommandOutput, ScriptedRunner};
use pushdeploy::deploy::{detector, restart};
use pushdeploy::server::serve::{router, MAX_BODY_BYTES};
use pushdeploy::webhook::request::{DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER};
use pushdeploy::webhook::signature::{compute_signature, SharedSecret};

const SECRET: &str = "9f2c4e71b8a3d05e6c1f7a2b";
const OLD: &str = "1111111111111111111111111111111111111111";
const NEW: &str = "2222222222222222222222222222222222222222";

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    runner: Arc<ScriptedRunner>,
    root: tempfile::TempDir,
}

fn app(runner: ScriptedRunner, unit: Option<&str>, wait_for_result: bool) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(runner);

    let mut options = AppOptions {
        wait_for_result,
        ..AppOptions::default()
    };
    options.deploy.project_root = dir.path().to_path_buf();
    options.deploy.timeout = Duration::from_secs(10);
    options.deploy.detector = detector::Options {
        unit: unit.map(str::to_string),
        ..detector::Options::default()
    };
    options.deploy.restart = restart::Options {
        unit: unit.map(str::to_string),
        poll_interval: Duration::ZERO,
        ..restart::Options::default()
    };

    let orchestrator = Arc::new(Orchestrator::new(runner.clone(), options.deploy.clone()));
    let state = Arc::new(AppState::with_orchestrator(
        SharedSecret::new(SECRET),
        &options,
        orchestrator,
    ));

    TestApp {
        router: router(Arc::new(state.server_state())),
        state,
        runner,
        root: dir,
    }
}

fn push_body(branch_ref: &str) -> Vec<u8> {
    serde_json::json!({
        "ref": branch_ref,
        "after": NEW,
        "pusher": { "name": "octocat" },
        "head_commit": { "id": NEW, "message": "Fix handler" }
    })
    .to_string()
    .into_bytes()
}

fn delivery(event: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header(EVENT_HEADER, event)
        .header(DELIVERY_HEADER, "72d3162e-cc78-11e3-81ab-4c9367dc0958");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body)).unwrap()
}

fn signed(event: &str, body: Vec<u8>) -> Request<Body> {
    let signature = compute_signature(&SharedSecret::new(SECRET), &body);
    delivery(event, body, Some(signature))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// A host where `git pull` works and HEAD moves from OLD to NEW
fn pulling_host() -> ScriptedRunner {
    let runner = ScriptedRunner::new();
    runner.push("git rev-parse HEAD", CommandOutput::ok(OLD));
    runner.push("git rev-parse HEAD", CommandOutput::ok(NEW));
    runner
}

#[tokio::test]
async fn test_push_to_main_with_active_unit_succeeds() {
    let runner = pulling_host().with_responder(|argv| match argv {
        ["systemctl", "is-active", "app"] => Some(Ok(CommandOutput::ok("active"))),
        _ => None,
    });
    let app = app(runner, Some("app"), true);

    let response = app
        .router
        .oneshot(signed("push", push_body("refs/heads/main")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["mode"], "process_supervised");
    assert_eq!(body["branch"], "main");
    assert_eq!(body["revision"], NEW);
    assert_eq!(app.runner.count("systemctl restart app"), 1);
}

#[tokio::test]
async fn test_invalid_signature_is_rejected_without_side_effects() {
    let app = app(ScriptedRunner::new(), None, true);
    let body = push_body("refs/heads/main");
    let forged = compute_signature(&SharedSecret::new("another-secret-of-length"), &body);

    let response = app
        .router
        .clone()
        .oneshot(delivery("push", body.clone(), Some(forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .oneshot(delivery("push", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn test_pull_request_event_is_filtered() {
    let app = app(ScriptedRunner::new(), None, true);

    let response = app
        .router
        .oneshot(signed("pull_request", push_body("refs/heads/main")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ignored");
    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn test_untracked_branch_and_ping_do_not_deploy() {
    let app = app(ScriptedRunner::new(), None, true);

    for branch_ref in ["refs/heads/feature", "refs/heads/Main", "main"] {
        let response = app
            .router
            .clone()
            .oneshot(signed("push", push_body(branch_ref)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ignored");
    }

    let response = app
        .router
        .oneshot(signed("ping", br#"{"zen":"Keep it logically awesome."}"#.to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "pong");

    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn test_unmanaged_host_reports_updated_not_restarted() {
    let app = app(pulling_host(), None, true);

    let response = app
        .router
        .oneshot(signed("push", push_body("refs/heads/main")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "updated_not_restarted");
    assert_eq!(body["mode"], "unmanaged");
    assert_eq!(app.runner.count("systemctl"), 0);
    assert_eq!(app.runner.count("docker"), 0);
}

#[tokio::test]
async fn test_both_branches_failing_reports_code_update_failed() {
    let runner = ScriptedRunner::new().with_responder(|argv| match argv {
        ["git", "rev-parse", "HEAD"] => Some(Ok(CommandOutput::ok(OLD))),
        ["git", "pull", ..] => Some(Ok(CommandOutput::failed(
            1,
            "fatal: unable to access remote: Could not resolve host",
        ))),
        ["git", "rev-parse", "-q", "--verify", "MERGE_HEAD"] => {
            Some(Ok(CommandOutput::failed(1, "")))
        }
        _ => None,
    });
    let app = app(runner, None, true);

    let response = app
        .router
        .oneshot(signed("push", push_body("refs/heads/main")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "code_update_failed");
    assert!(body.get("revision").is_none());
    assert_eq!(app.runner.count("git pull --ff-only origin main"), 1);
    assert_eq!(app.runner.count("git pull --ff-only origin master"), 1);
    assert_eq!(app.runner.count("git reset"), 0);
}

#[tokio::test]
async fn test_malformed_payload_after_valid_signature() {
    let app = app(ScriptedRunner::new(), None, true);

    let response = app
        .router
        .oneshot(signed("push", b"{not json".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = app(ScriptedRunner::new(), None, true);
    let body = vec![b' '; MAX_BODY_BYTES + 1];
    let mut request = signed("push", body);
    request.headers_mut().insert(
        "content-length",
        (MAX_BODY_BYTES + 1).to_string().parse().unwrap(),
    );

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_deliveries_run_one_deploy() {
    let runner = pulling_host()
        .with_delay(Duration::from_millis(30))
        .with_responder(|argv| match argv {
            ["systemctl", "is-active", "app"] => Some(Ok(CommandOutput::ok("active"))),
            _ => None,
        });
    let app = app(runner, Some("app"), false);

    let requests = (0..4).map(|_| {
        app.router
            .clone()
            .oneshot(signed("push", push_body("refs/heads/main")))
    });
    let responses = futures::future::join_all(requests).await;

    let mut accepted = 0;
    let mut busy = 0;
    for response in responses {
        let response = response.unwrap();
        match response.status() {
            StatusCode::OK => {
                assert_eq!(json_body(response).await["status"], "accepted");
                accepted += 1;
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                assert_eq!(json_body(response).await["status"], "busy");
                busy += 1;
            }
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(busy, 3);

    assert!(app.state.deployer.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(app.runner.count("systemctl restart app"), 1);
    assert_eq!(app.runner.count("git pull"), 1);
}

#[tokio::test]
async fn test_manual_deploy_in_progress_answers_busy() {
    let app = app(pulling_host(), None, true);
    let manual = RunLock::try_acquire(app.root.path()).unwrap();

    let response = app
        .router
        .clone()
        .oneshot(signed("push", push_body("refs/heads/main")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["status"], "busy");
    assert!(app.runner.calls().is_empty());

    drop(manual);
    let response = app
        .router
        .oneshot(signed("push", push_body("refs/heads/main")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "updated_not_restarted");
}

#[tokio::test]
async fn test_health_and_version() {
    let app = app(ScriptedRunner::new(), None, false);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");

    let response = app
        .router
        .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["version"],
        env!("CARGO_PKG_VERSION")
    );
}
