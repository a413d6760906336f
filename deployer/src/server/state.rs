//! Server state

use std::sync::Arc;

use crate::webhook::filter::EventFilter;
use crate::webhook::signature::SharedSecret;
use crate::workers::deployer::Deployer;

/// Server state shared across handlers
pub struct ServerState {
    pub secret: SharedSecret,
    pub filter: EventFilter,
    pub deployer: Arc<Deployer>,

    /// Hold the response until the deploy finished
    pub wait_for_result: bool,
}

impl ServerState {
    pub fn new(
        secret: SharedSecret,
        filter: EventFilter,
        deployer: Arc<Deployer>,
        wait_for_result: bool,
    ) -> Self {
        Self {
            secret,
            filter,
            deployer,
            wait_for_result,
        }
    }
}
