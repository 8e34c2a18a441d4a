//! Run lifecycle controller.
//!
//! Accepts generate/cancel/quit commands from a presentation layer, allows at
//! most one run at a time, and emits events for presentation layers.

use super::Orchestrator;
use crate::error::Result;
use crate::invoke::RunControl;
use crate::model::{RunEvent, RunReport};
use crate::params::GensysParameters;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Commands emitted by UI layers to control generation.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    /// Start a run with a snapshot of the parameters. Rejected while a run is active.
    Generate(Box<GensysParameters>),
    Cancel,
    /// Stop accepting commands once the active run, if any, has finished.
    Quit,
}

/// Internal handle for a running generation task.
struct RunCtx {
    ctrl_tx: UnboundedSender<RunControl>,
    handle: Option<tokio::task::JoinHandle<Result<RunReport>>>,
}

/// Spawn a new run and return its control handle.
fn start_run(
    orchestrator: &Arc<Orchestrator>,
    params: GensysParameters,
    event_tx: UnboundedSender<RunEvent>,
) -> RunCtx {
    let (ctrl_tx, ctrl_rx) = tokio::sync::mpsc::unbounded_channel::<RunControl>();
    let orchestrator = Arc::clone(orchestrator);
    let handle = tokio::spawn(async move { orchestrator.run(&params, ctrl_rx, event_tx).await });
    RunCtx {
        ctrl_tx,
        handle: Some(handle),
    }
}

/// Drive runs from UI commands until `Quit` (or the command channel closes)
/// and the active run has completed.
pub async fn run_controller(
    orchestrator: Arc<Orchestrator>,
    event_tx: UnboundedSender<RunEvent>,
    mut cmd_rx: UnboundedReceiver<ControlCommand>,
) {
    let mut run_ctx: Option<RunCtx> = None;
    let mut quit_pending = false;
    let mut commands_open = true;
    // Cancel watchdog: if the tool is slow to die, keep the UI informed.
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        if quit_pending && run_ctx.is_none() {
            break;
        }

        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(ControlCommand::Generate(params)) => {
                        if run_ctx.is_some() || quit_pending {
                            let _ = event_tx.send(RunEvent::RunRejected {
                                identifier: params.identifier.clone(),
                            });
                        } else {
                            run_ctx = Some(start_run(&orchestrator, *params, event_tx.clone()));
                        }
                    }
                    Some(ControlCommand::Cancel) => {
                        if let Some(ctx) = &run_ctx {
                            let _ = ctx.ctrl_tx.send(RunControl::Cancel);
                            let _ = event_tx.send(RunEvent::Info("Cancelling…".into()));
                            cancel_deadline =
                                Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        }
                    }
                    Some(ControlCommand::Quit) => quit_pending = true,
                    None => {
                        commands_open = false;
                        quit_pending = true;
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    match join_res {
                        Ok(Ok(report)) => {
                            let _ = event_tx.send(RunEvent::RunCompleted { report: Box::new(report) });
                        }
                        Ok(Err(e)) => {
                            let _ = event_tx.send(RunEvent::RunFailed { message: e.to_string() });
                        }
                        Err(e) => {
                            let _ = event_tx.send(RunEvent::RunFailed {
                                message: format!("run task failed: {e}"),
                            });
                        }
                    }
                    run_ctx = None;
                    cancel_deadline = None;
                }
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline && run_ctx.is_some() {
                        let _ = event_tx.send(RunEvent::Info("Still cancelling…".into()));
                        cancel_deadline = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunConfig;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn missing_tool_is_reported_as_a_failed_run() {
        let root = TempDir::new().expect("failed to create temp dir");
        let cfg = RunConfig {
            project_plugins_dir: root.path().join("Plugins"),
            engine_plugins_dir: None,
            content_dir: root.path().join("Content"),
            ..RunConfig::default()
        };
        let orchestrator = Arc::new(Orchestrator::new(cfg, None));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        cmd_tx
            .send(ControlCommand::Generate(Box::new(GensysParameters::with_identifier("x"))))
            .expect("send generate");
        cmd_tx.send(ControlCommand::Quit).expect("send quit");
        run_controller(orchestrator, event_tx, cmd_rx).await;

        let mut failure = None;
        while let Ok(ev) = event_rx.try_recv() {
            if let RunEvent::RunFailed { message } = ev {
                failure = Some(message);
            }
        }
        let message = failure.expect("run should fail");
        assert!(message.contains("generator tool not found"), "{message}");
        assert!(!root.path().join("Content").exists());
    }

    #[tokio::test]
    async fn closing_the_command_channel_stops_an_idle_controller() {
        let root = TempDir::new().expect("failed to create temp dir");
        let cfg = RunConfig {
            project_plugins_dir: root.path().to_path_buf(),
            content_dir: root.path().join("Content"),
            ..RunConfig::default()
        };
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ControlCommand>();
        drop(cmd_tx);
        tokio::time::timeout(
            Duration::from_secs(5),
            run_controller(Arc::new(Orchestrator::new(cfg, None)), event_tx, cmd_rx),
        )
        .await
        .expect("controller should exit");
    }
}
