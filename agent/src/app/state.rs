//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::archive::encoding::{encoding_for_label, host_encoding_from_env, EncodingCandidates};
use crate::archive::Extractor;
use crate::authn::AuthGate;
use crate::deploy::{LocalContentStore, UpdateOrchestrator};
use crate::errors::AgentError;
use crate::filesys::snapshot::SnapshotManager;
use crate::lifecycle::ControlOptions;
use crate::server::state::Gates;
use crate::storage::settings::Settings;
use crate::targets::TargetRegistry;

/// Main application state, built once from settings
pub struct AppState {
    /// Configured targets
    pub registry: Arc<TargetRegistry>,

    /// Update pipeline
    pub orchestrator: Arc<UpdateOrchestrator>,

    /// Per-operation signature gates
    pub gates: Gates,

    /// Process-wide control configuration
    pub control: ControlOptions,
}

impl AppState {
    /// Initialize application state
    pub fn init(settings: &Settings) -> Result<Self, AgentError> {
        info!("Initializing application state...");
        settings.validate()?;

        let control = settings.control.to_options();
        let registry = Arc::new(TargetRegistry::from_settings(settings, &control)?);

        let host = match &settings.host_code_page {
            Some(label) => encoding_for_label(label),
            None => host_encoding_from_env(),
        };
        let candidates = EncodingCandidates::with_host(host);
        info!(
            encodings = ?candidates.iter().map(|e| e.name()).collect::<Vec<_>>(),
            "Archive name encodings"
        );

        let store = LocalContentStore::new(
            SnapshotManager::new(settings.retention_days),
            Extractor::new(candidates),
        );
        let orchestrator = Arc::new(UpdateOrchestrator::new(Arc::new(store), control.settle));

        let suffix = settings.auth.signature_suffix.as_str();
        let secrets = &settings.auth.secrets;
        let gates = Gates {
            update: AuthGate::new(secrets.update.as_ref(), suffix),
            start: AuthGate::new(secrets.start.as_ref(), suffix),
            stop: AuthGate::new(secrets.stop.as_ref(), suffix),
            host_info: AuthGate::new(secrets.host_info.as_ref(), suffix),
        };

        info!("Loaded {} targets: {:?}", registry.len(), registry.names().collect::<Vec<_>>());

        Ok(Self {
            registry,
            orchestrator,
            gates,
            control,
        })
    }

    /// Shutdown application state. Waits for any in-flight update.
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        info!("Shutting down application state...");
        for name in self.registry.names() {
            let _guard = self.orchestrator.locks().acquire(name).await;
        }
        Ok(())
    }
}
