//! One generation run: resolve → export → invoke → import.

use crate::bootstrap::{bootstrap_content, BootstrapReport};
use crate::error::{GensysError, Result};
use crate::exchange::export_params;
use crate::import::ResultImporter;
use crate::invoke::{self, RunControl};
use crate::locate::LocationResolver;
use crate::model::{RunConfig, RunEvent, RunOutcome, RunPhase, RunReport};
use crate::params::GensysParameters;
use crate::registry::{AssetRegistry, ImportPolicy};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

pub struct Orchestrator {
    cfg: RunConfig,
    resolver: LocationResolver,
    registry: Option<Arc<dyn AssetRegistry>>,
    import_policy: ImportPolicy,
    // Held for the whole run; a second caller gets RunInProgress instead of racing on input.json.
    active: Mutex<()>,
}

impl Orchestrator {
    pub fn new(cfg: RunConfig, registry: Option<Arc<dyn AssetRegistry>>) -> Self {
        Self {
            resolver: LocationResolver::from_config(&cfg),
            cfg,
            registry,
            import_policy: ImportPolicy::OVERWRITE,
            active: Mutex::new(()),
        }
    }

    /// Policy for registering imported rasters; defaults to [`ImportPolicy::OVERWRITE`].
    pub fn with_import_policy(mut self, policy: ImportPolicy) -> Self {
        self.import_policy = policy;
        self
    }

    pub fn is_running(&self) -> bool {
        self.active.try_lock().is_err()
    }

    /// Prepare the content store. Meant to be called once at startup.
    pub fn bootstrap(&self) -> BootstrapReport {
        let location = match self.resolver.resolve() {
            Ok(loc) => Some(loc),
            Err(e) => {
                log::warn!("{e}");
                None
            }
        };
        bootstrap_content(&self.cfg.content_dir, location.as_ref())
    }

    /// Run the generator once for `params`.
    ///
    /// Returns an error only when the run could not start: invalid parameters,
    /// no tool install, or another run in flight. Those cases write nothing.
    /// Once started, export and invocation failures are recorded in the report
    /// and the import step always runs.
    pub async fn run(
        &self,
        params: &GensysParameters,
        mut control_rx: UnboundedReceiver<RunControl>,
        event_tx: UnboundedSender<RunEvent>,
    ) -> Result<RunReport> {
        let _guard = self.active.try_lock().map_err(|_| GensysError::RunInProgress)?;
        let started = Instant::now();
        params.validate()?;

        let _ = event_tx.send(RunEvent::PhaseStarted {
            phase: RunPhase::Resolve,
        });
        let location = self.resolver.resolve()?;

        let _ = event_tx.send(RunEvent::PhaseStarted {
            phase: RunPhase::Export,
        });
        let (exchange_file, export_error) = match export_params(params, &location.working_dir) {
            Ok(path) => (Some(path), None),
            Err(e) => {
                log::warn!("Parameter export failed: {e}");
                let _ = event_tx.send(RunEvent::Info(format!(
                    "Parameter export failed, the tool will read a stale input.json: {e}"
                )));
                (None, Some(e.to_string()))
            }
        };

        let _ = event_tx.send(RunEvent::PhaseStarted {
            phase: RunPhase::Invoke,
        });
        let invocation =
            invoke::run_tool(&location, self.cfg.timeout, &mut control_rx, &event_tx).await;

        let _ = event_tx.send(RunEvent::PhaseStarted {
            phase: RunPhase::Import,
        });
        let import = ResultImporter::new(&self.cfg.content_dir, self.registry.as_deref())
            .with_policy(self.import_policy)
            .import(&location, &params.identifier, &event_tx);

        let _ = event_tx.send(RunEvent::PhaseStarted {
            phase: RunPhase::Summary,
        });
        let outcome = RunOutcome::classify(&invocation, &import);
        log::info!(
            "Run {} {} ({} of {} artifacts imported)",
            params.identifier,
            outcome.label(),
            import.imported.len(),
            crate::model::ArtifactKind::ALL.len()
        );

        Ok(RunReport {
            timestamp_utc: crate::storage::now_rfc3339(),
            identifier: params.identifier.clone(),
            location,
            exchange_file,
            export_error,
            invocation,
            import,
            outcome,
            elapsed: started.elapsed(),
        })
    }
}
