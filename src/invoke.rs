//! Runs the generator tool as a child process.
//!
//! The tool takes no arguments: it reads `input.json` from its working
//! directory and writes its rasters next to it. Invocation is bounded by a
//! timeout and can be cancelled through the run's control channel; in both
//! cases the child is killed before returning. The tool's console output is
//! relayed as `Info` events and never reaches our own stdout.

use crate::model::{InstallLocation, InvocationState, RunEvent};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const RELAY_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum RunControl {
    /// Kill the tool and finish the run with whatever artifacts exist.
    Cancel,
}

/// Run the tool to completion, timeout, or cancellation, emitting each state change.
pub async fn run_tool(
    location: &InstallLocation,
    timeout: Duration,
    control_rx: &mut UnboundedReceiver<RunControl>,
    event_tx: &UnboundedSender<RunEvent>,
) -> InvocationState {
    let state = match spawn(location) {
        Ok(mut child) => {
            let _ = event_tx.send(RunEvent::Invocation(InvocationState::Running));
            let relays = forward_output(&mut child, event_tx);
            let state = supervise(child, timeout, control_rx).await;
            // A grandchild may still hold the pipes open; don't wait on it for long.
            for relay in relays {
                if tokio::time::timeout(RELAY_DRAIN, relay).await.is_err() {
                    log::debug!("Generator output still open after exit; detaching");
                }
            }
            state
        }
        Err(reason) => InvocationState::Failed { reason },
    };

    match &state {
        InvocationState::Exited { code: Some(0) } => log::info!("Generator finished"),
        InvocationState::Exited { .. } => {
            log::warn!("Generator {}; importing whatever it produced", state.describe())
        }
        other => log::warn!("Generator {}", other.describe()),
    }
    let _ = event_tx.send(RunEvent::Invocation(state.clone()));
    state
}

fn spawn(location: &InstallLocation) -> Result<Child, String> {
    // Relative program paths are ambiguous once current_dir is set.
    let program = std::fs::canonicalize(&location.executable)
        .map_err(|e| format!("{}: {e}", location.executable.display()))?;
    log::info!(
        "Launching {} in {}",
        program.display(),
        location.working_dir.display()
    );
    Command::new(&program)
        .current_dir(&location.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("{}: {e}", program.display()))
}

fn forward_output(
    child: &mut Child,
    event_tx: &UnboundedSender<RunEvent>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut relays = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        relays.push(tokio::spawn(relay_lines(stdout, event_tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        relays.push(tokio::spawn(relay_lines(stderr, event_tx.clone())));
    }
    relays
}

async fn relay_lines<R: AsyncRead + Unpin>(reader: R, event_tx: UnboundedSender<RunEvent>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                log::debug!(target: "gensys::tool", "{line}");
                let _ = event_tx.send(RunEvent::Info(format!("[tool] {line}")));
            }
            Ok(None) => break,
            Err(e) => {
                log::debug!("Stopped reading generator output: {e}");
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    timeout: Duration,
    control_rx: &mut UnboundedReceiver<RunControl>,
) -> InvocationState {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut control_open = true;

    loop {
        tokio::select! {
            status = child.wait() => {
                return match status {
                    Ok(status) => InvocationState::Exited { code: status.code() },
                    Err(e) => InvocationState::Failed { reason: format!("wait failed: {e}") },
                };
            }
            _ = &mut deadline => {
                terminate(&mut child).await;
                return InvocationState::TimedOut { after: timeout };
            }
            msg = control_rx.recv(), if control_open => {
                match msg {
                    Some(RunControl::Cancel) => {
                        terminate(&mut child).await;
                        return InvocationState::Cancelled;
                    }
                    // Nobody can cancel any more; keep waiting on the child and the deadline.
                    None => control_open = false,
                }
            }
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        log::warn!("Failed to kill generator process: {e}");
    }
}
