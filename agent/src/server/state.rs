//! Server state

use std::sync::Arc;

use crate::authn::AuthGate;
use crate::deploy::UpdateOrchestrator;
use crate::targets::TargetRegistry;

/// Secret gates, one per operation
#[derive(Debug, Clone)]
pub struct Gates {
    pub update: AuthGate,
    pub start: AuthGate,
    pub stop: AuthGate,
    pub host_info: AuthGate,
}

/// Server state shared across handlers
pub struct ServerState {
    pub registry: Arc<TargetRegistry>,
    pub orchestrator: Arc<UpdateOrchestrator>,
    pub gates: Gates,
    pub max_upload_bytes: usize,
}

impl ServerState {
    pub fn new(
        registry: Arc<TargetRegistry>,
        orchestrator: Arc<UpdateOrchestrator>,
        gates: Gates,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            gates,
            max_upload_bytes,
        }
    }
}
