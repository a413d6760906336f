//! FSM unit tests

use pushdeploy::deploy::fsm::{DeployEvent, DeployFsm, DeployState, Phase};
use pushdeploy::models::deployment::DeploymentStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeployFsm::new();
    assert_eq!(fsm.state(), DeployState::NotStarted);
    assert!(fsm.error().is_none());
    assert!(!fsm.can_restart());
    assert!(fsm.status().is_none());
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = DeployFsm::new();

    // NotStarted -> Updated
    fsm.process(DeployEvent::UpdateSucceeded).unwrap();
    assert_eq!(fsm.state(), DeployState::Updated);

    // Updated -> Restarted
    fsm.process(DeployEvent::RestartSucceeded).unwrap();
    assert_eq!(fsm.state(), DeployState::Restarted);
    assert_eq!(fsm.status(), Some(DeploymentStatus::Succeeded));
}

#[test]
fn test_fsm_update_failure_is_terminal() {
    let mut fsm = DeployFsm::new();

    fsm.process(DeployEvent::UpdateFailed("test error".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeployState::Failed(Phase::Update));
    assert_eq!(fsm.error(), Some("test error"));
    assert!(!fsm.can_restart());
    assert_eq!(fsm.status(), Some(DeploymentStatus::CodeUpdateFailed));

    // No restart can follow a failed update
    assert!(fsm.process(DeployEvent::RestartSucceeded).is_err());
    assert_eq!(fsm.state(), DeployState::Failed(Phase::Update));
}

#[test]
fn test_fsm_updated_without_restart() {
    let mut fsm = DeployFsm::new();
    fsm.process(DeployEvent::UpdateSucceeded).unwrap();
    assert_eq!(fsm.status(), Some(DeploymentStatus::UpdatedNotRestarted));
    assert_eq!(fsm.status().map(|s| s.exit_code()), Some(0));
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeployFsm::new();

    // Cannot restart before updating
    let result = fsm.process(DeployEvent::RestartSucceeded);
    assert!(result.is_err());
    assert_eq!(fsm.state(), DeployState::NotStarted);

    // Cannot update twice
    fsm.process(DeployEvent::UpdateSucceeded).unwrap();
    assert!(fsm.process(DeployEvent::UpdateSucceeded).is_err());
}
