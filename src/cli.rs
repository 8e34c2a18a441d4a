use crate::model::{RunConfig, RunEvent, RunOutcome, RunReport, DEFAULT_EXECUTABLE};
use crate::orchestrator::{run_controller, ControlCommand, Orchestrator};
use crate::params::{load_params, GensysParameters};
use crate::registry::{AssetRegistry, ImportPolicy, ManifestRegistry};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
///
/// Locks are taken per line: the logger writes to stderr from other threads.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let mut out = stdout.lock();
                    let _ = writeln!(out, "{}", msg);
                    let _ = out.flush();
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(stderr.lock(), "{}", msg);
                }
            }
        }
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "gensys",
    version,
    about = "Run the GenSys terrain generator and import its rasters into the content store"
)]
pub struct Cli {
    /// Project plugins directory; a tool installed here overrides the engine-wide one
    #[arg(long, default_value = "Plugins")]
    pub project_plugins: PathBuf,

    /// Engine-wide plugins directory (shared install)
    #[arg(long)]
    pub engine_plugins: Option<PathBuf>,

    /// Root of the managed content store
    #[arg(long, default_value = "Content")]
    pub content_dir: PathBuf,

    /// Generator executable inside GenSys/Resources/GenSysCoreShell
    #[arg(long, default_value = DEFAULT_EXECUTABLE)]
    pub executable: String,

    /// Kill the generator if it runs longer than this
    #[arg(long, default_value = "10m")]
    pub timeout: humantime::Duration,

    /// Load parameters from a JSON file (input.json field names plus Identifier)
    #[arg(long)]
    pub params: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ParamArgs,

    /// Print the run report as JSON instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Skip preparing the content folders and shared materials
    #[arg(long)]
    pub no_bootstrap: bool,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Keep per-asset settings edited in the store when re-importing a run
    #[arg(long)]
    pub keep_asset_settings: bool,

    /// Also write the run report to this file
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Show the N most recent saved runs and exit
    #[arg(long, value_name = "N")]
    pub history: Option<usize>,
}

/// Per-field parameter overrides, applied on top of `--params` or the defaults.
#[derive(Debug, clap::Args, Clone, Default)]
pub struct ParamArgs {
    /// Name of the destination folder under Gensys/
    #[arg(long)]
    pub identifier: Option<String>,
    /// Value noise octaves (0-5)
    #[arg(long)]
    pub value_noise_octaves: Option<u32>,
    /// Blur radius in pixels (0-5)
    #[arg(long)]
    pub blur_pixel_radius: Option<f64>,
    /// Granularity (0-1)
    #[arg(long)]
    pub granularity: Option<f64>,
    /// Reserved; ignored by the generator
    #[arg(long)]
    pub river_generation_iterations: Option<u32>,
    /// River resolution (0.90-1)
    #[arg(long)]
    pub river_resolution: Option<f64>,
    /// River thickness in pixels
    #[arg(long)]
    pub river_thickness: Option<u32>,
    #[arg(long)]
    pub river_allow_node_mismatch: Option<bool>,
    #[arg(long)]
    pub rivers_on_given_features: Option<bool>,
    /// River strength (0-1)
    #[arg(long)]
    pub river_strength_factor: Option<f64>,
    /// Terrain layers (1-4)
    #[arg(long)]
    pub number_of_terrain_layers: Option<u32>,
    /// Foliage layers (1-4)
    #[arg(long)]
    pub number_of_foliage_layers: Option<u32>,
    /// Foliage wholeness (0-1)
    #[arg(long)]
    pub foliage_wholeness: Option<f64>,
    /// Minimum unit foliage height (0-1)
    #[arg(long)]
    pub min_unit_foliage_height: Option<f64>,
    /// Terrain outline map (512x512 raster)
    #[arg(long)]
    pub terrain_outline_map: Option<String>,
    /// Terrain feature map (512x512 raster)
    #[arg(long)]
    pub terrain_feature_map: Option<String>,
    /// River outline map (512x512 raster)
    #[arg(long)]
    pub river_outline: Option<String>,
}

impl ParamArgs {
    pub fn apply_to(&self, p: &mut GensysParameters) {
        fn set<T: Clone>(dst: &mut T, src: &Option<T>) {
            if let Some(v) = src {
                *dst = v.clone();
            }
        }
        set(&mut p.identifier, &self.identifier);
        set(&mut p.value_noise_octaves, &self.value_noise_octaves);
        set(&mut p.blur_pixel_radius, &self.blur_pixel_radius);
        set(&mut p.granularity, &self.granularity);
        set(&mut p.river_generation_iterations, &self.river_generation_iterations);
        set(&mut p.river_resolution, &self.river_resolution);
        set(&mut p.river_thickness, &self.river_thickness);
        set(&mut p.river_allow_node_mismatch, &self.river_allow_node_mismatch);
        set(&mut p.rivers_on_given_features, &self.rivers_on_given_features);
        set(&mut p.river_strength_factor, &self.river_strength_factor);
        set(&mut p.number_of_terrain_layers, &self.number_of_terrain_layers);
        set(&mut p.number_of_foliage_layers, &self.number_of_foliage_layers);
        set(&mut p.foliage_wholeness, &self.foliage_wholeness);
        set(&mut p.min_unit_foliage_height, &self.min_unit_foliage_height);
        set(&mut p.user_terrain_outline_map, &self.terrain_outline_map);
        set(&mut p.user_terrain_feature_map, &self.terrain_feature_map);
        set(&mut p.user_river_outline, &self.river_outline);
    }
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        project_plugins_dir: args.project_plugins.clone(),
        engine_plugins_dir: args.engine_plugins.clone(),
        content_dir: args.content_dir.clone(),
        executable_name: args.executable.clone(),
        timeout: args.timeout.into(),
    }
}

/// Assemble the parameter record: file (or defaults), then flag overrides.
pub fn build_params(args: &Cli) -> Result<GensysParameters> {
    let mut params = match args.params.as_deref() {
        Some(path) => load_params(path)
            .with_context(|| format!("failed to load parameters from {}", path.display()))?,
        None => GensysParameters::default(),
    };
    args.overrides.apply_to(&mut params);
    Ok(params)
}

pub async fn run(args: Cli) -> Result<()> {
    if let Some(n) = args.history {
        return show_history(n);
    }

    let params = build_params(&args)?;
    params.validate()?;
    let cfg = build_config(&args);

    let registry: Arc<dyn AssetRegistry> = Arc::new(
        ManifestRegistry::open(&cfg.content_dir).context("failed to open the asset registry")?,
    );
    let policy = ImportPolicy {
        replace_existing_settings: !args.keep_asset_settings,
        ..ImportPolicy::OVERWRITE
    };
    let orchestrator = Arc::new(Orchestrator::new(cfg, Some(registry)).with_import_policy(policy));
    if !args.no_bootstrap {
        orchestrator.bootstrap();
    }

    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ControlCommand>();
    let controller = tokio::spawn(run_controller(orchestrator, event_tx, cmd_rx));

    cmd_tx
        .send(ControlCommand::Generate(Box::new(params)))
        .context("controller stopped before the run started")?;
    let _ = cmd_tx.send(ControlCommand::Quit);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_sent = false;
    let mut report: Option<RunReport> = None;
    let mut failure: Option<String> = None;

    loop {
        tokio::select! {
            ev = event_rx.recv() => {
                let Some(ev) = ev else { break };
                match ev {
                    RunEvent::RunCompleted { report: r } => report = Some(*r),
                    RunEvent::RunFailed { message } => failure = Some(message),
                    other => {
                        if let Some(line) = describe_event(&other) {
                            let _ = out_tx.send(OutputLine::Stderr(line));
                        }
                    }
                }
            }
            _ = &mut ctrl_c, if !cancel_sent => {
                cancel_sent = true;
                let _ = cmd_tx.send(ControlCommand::Cancel);
            }
        }
    }
    controller.await.context("run controller task failed")?;

    let report = match (report, failure) {
        (Some(r), _) => r,
        (None, Some(message)) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(anyhow::anyhow!(message));
        }
        (None, None) => anyhow::bail!("run finished without a report"),
    };

    if let Some(path) = args.export_json.as_deref() {
        crate::storage::export_json(path, &report)?;
    }
    if args.auto_save {
        match crate::storage::save_run(&report) {
            Ok(p) => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
            }
            Err(e) => log::warn!("Could not save run history: {e:#}"),
        }
    }

    if args.json {
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(&report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    match report.outcome {
        RunOutcome::Succeeded { .. } => Ok(()),
        ref other => anyhow::bail!("run {} {}", report.identifier, other.label()),
    }
}

fn describe_event(ev: &RunEvent) -> Option<String> {
    match ev {
        RunEvent::PhaseStarted { phase } => Some(format!("== {phase:?} ==")),
        RunEvent::Invocation(state) => Some(format!("Generator {}", state.describe())),
        RunEvent::ArtifactImported { asset_path, .. } => Some(format!("Imported {asset_path}")),
        RunEvent::ArtifactSkipped { artifact, reason } => {
            Some(format!("Skipped {artifact}: {reason}"))
        }
        RunEvent::Info(msg) => Some(msg.clone()),
        RunEvent::RunRejected { identifier } => Some(format!(
            "Run {identifier} rejected: another run is in progress"
        )),
        RunEvent::RunFailed { .. } | RunEvent::RunCompleted { .. } => None,
    }
}

fn show_history(n: usize) -> Result<()> {
    let dir = crate::storage::runs_dir()?;
    let runs = crate::storage::load_recent_in(&dir, n)?;
    if runs.is_empty() {
        println!("No saved runs in {}", dir.display());
    }
    for run in runs {
        println!(
            "{}  {:<24} {}",
            run.timestamp_utc,
            run.identifier,
            run.outcome.label()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn flags_override_the_parameter_file() {
        let dir = tempfile::TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"Identifier":"file","Granularity":0.5}"#).expect("write");

        let args = Cli::parse_from([
            "gensys",
            "--params",
            path.to_str().expect("utf-8 path"),
            "--identifier",
            "flag",
            "--river-allow-node-mismatch",
            "true",
            "--number-of-terrain-layers",
            "3",
        ]);
        let p = build_params(&args).expect("build params");
        assert_eq!(p.identifier, "flag");
        assert_eq!(p.granularity, 0.5);
        assert!(p.river_allow_node_mismatch);
        assert_eq!(p.number_of_terrain_layers, 3);
    }

    #[test]
    fn config_defaults() {
        let args = Cli::parse_from(["gensys", "--timeout", "90s"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.executable_name, "CoreTester.exe");
        assert_eq!(cfg.project_plugins_dir, PathBuf::from("Plugins"));
        assert_eq!(cfg.engine_plugins_dir, None);
        assert_eq!(cfg.timeout, Duration::from_secs(90));
    }
}
