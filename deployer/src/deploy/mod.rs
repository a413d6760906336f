//! Deployment module

pub mod compose;
pub mod detector;
pub mod fsm;
pub mod git;
pub mod lock;
pub mod orchestrator;
pub mod restart;
pub mod runner;
pub mod systemd;
