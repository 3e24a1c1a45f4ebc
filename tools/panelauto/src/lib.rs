pub mod config;
pub mod errors;
pub mod logging;
pub mod messages;
pub mod prompt;
pub mod record;
pub mod replay;
pub mod runtime;
pub mod script;
pub mod spec_tree;
pub mod substitute;
pub mod validation;
pub mod variables;

use clap::{error::ErrorKind, Parser};
use config::{absolutize_path, load_config, AppConfig, CliOverrides};
use errors::PanelAutoError;
use logging::{EventSink, JsonlLogger, NullSink};
use messages::MessageCatalog;
use prompt::TerminalPrompt;
use record::record_panel;
use replay::ReplayEngine;
use runtime::ProductionRuntime;
use script::AutomationScript;
use spec_tree::FieldSpecTree;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use validation::ValidatorRegistry;
use variables::VariableStore;

#[derive(Debug, Clone, Parser)]
#[command(name = "panelauto")]
#[command(about = "Record and replay installer user-input panels unattended")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Field specification tree (JSON).
    #[arg(long)]
    pub spec: Option<PathBuf>,
    /// Automation script to replay.
    #[arg(long)]
    pub script: Option<PathBuf>,
    /// Message catalog (TOML) overlaying the built-in prompts.
    #[arg(long)]
    pub messages: Option<PathBuf>,
    /// Initial variable values (TOML table).
    #[arg(long)]
    pub variables: Option<PathBuf>,
    /// Write the final variable store here (TOML table).
    #[arg(long = "variables-out")]
    pub variables_out: Option<PathBuf>,
    /// Record the current variables into a new script instead of replaying.
    #[arg(long = "record-to")]
    pub record_to: Option<PathBuf>,
    /// Restrict recording or replay to these panel ids.
    #[arg(long = "panel")]
    pub panels: Vec<String>,
    /// Seconds to wait for each answer; 0 waits forever.
    #[arg(long = "prompt-timeout")]
    pub prompt_timeout: Option<u64>,
    /// Append structured events to this JSONL file.
    #[arg(long)]
    pub log: Option<PathBuf>,
}

pub fn run() -> Result<i32, PanelAutoError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| PanelAutoError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime, CancellationToken::new())
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
    cancel: CancellationToken,
) -> Result<i32, PanelAutoError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(PanelAutoError::Cli(error.to_string())),
        },
    };

    match (&cli.script, &cli.record_to) {
        (None, None) => {
            return Err(PanelAutoError::Cli(
                "one of --script or --record-to is required".to_string(),
            ))
        }
        (Some(_), Some(_)) => {
            return Err(PanelAutoError::Cli(
                "--script and --record-to cannot be combined".to_string(),
            ))
        }
        _ => {}
    }

    let overrides = CliOverrides {
        config_path: cli.config.as_ref().map(|p| absolutize_path(cwd, p)),
        spec_path: cli.spec.clone(),
        messages_path: cli.messages.clone(),
        log_path: cli.log.clone(),
        prompt_timeout_seconds: cli.prompt_timeout,
    };
    let fs = runtime.file_system.as_ref();
    let cfg = load_config(&overrides, cwd, fs)?;

    let spec = FieldSpecTree::load(fs, &cfg.spec.path)?;
    let catalog = match &cfg.messages.path {
        Some(path) => MessageCatalog::load(fs, path)?,
        None => MessageCatalog::default(),
    };
    let mut store = match &cli.variables {
        Some(path) => VariableStore::load(fs, &absolutize_path(cwd, path))?,
        None => VariableStore::new(),
    };

    if let Some(record_to) = &cli.record_to {
        record_session(
            runtime,
            &cfg,
            &spec,
            &store,
            &cli.panels,
            &absolutize_path(cwd, record_to),
        )?;
    } else if let Some(script_path) = &cli.script {
        let script = AutomationScript::load(fs, &absolutize_path(cwd, script_path))?;
        let script = select_panels(script, &cli.panels);
        let sink = event_sink(&cfg);
        let prompt = TerminalPrompt::new(Arc::clone(&runtime.terminal), cancel.clone())
            .with_timeout(cfg.prompt_timeout());
        let registry = ValidatorRegistry::with_defaults();
        let engine = ReplayEngine::new(&spec, &catalog, &registry, &prompt)
            .with_sink(sink.as_ref())
            .with_cancellation(cancel);
        let summaries = engine.run_script(&script, &mut store)?;

        let entries: usize = summaries.iter().map(|s| s.entries.len()).sum();
        let prompted: usize = summaries.iter().map(|s| s.prompted()).sum();
        for summary in &summaries {
            let unresolved = summary.unresolved_keys();
            if !unresolved.is_empty() {
                runtime.terminal.write_line(&format!(
                    "warning: panel {} left unresolved: {}",
                    summary.panel_id,
                    unresolved.join(", ")
                ))?;
            }
        }
        runtime.terminal.write_line(&format!(
            "replay complete: panels={} entries={entries} prompted={prompted}",
            summaries.len()
        ))?;
    }

    if let Some(out) = &cli.variables_out {
        store.save(fs, &absolutize_path(cwd, out))?;
    }
    Ok(0)
}

fn record_session(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    spec: &FieldSpecTree,
    store: &VariableStore,
    panels: &[String],
    record_to: &Path,
) -> Result<(), PanelAutoError> {
    let panel_ids: Vec<String> = if panels.is_empty() {
        spec.panel_ids().into_iter().map(str::to_string).collect()
    } else {
        panels.to_vec()
    };
    let script = AutomationScript {
        panels: panel_ids
            .iter()
            .map(|id| record_panel(spec, id, store, &cfg.record.direct_variables))
            .collect::<Result<Vec<_>, _>>()?,
    };
    script.save(runtime.file_system.as_ref(), record_to)?;
    let entries: usize = script.panels.iter().map(|p| p.entries.len()).sum();
    runtime.terminal.write_line(&format!(
        "record complete: panels={} entries={entries} script={}",
        script.panels.len(),
        record_to.display()
    ))
}

fn select_panels(mut script: AutomationScript, panels: &[String]) -> AutomationScript {
    if !panels.is_empty() {
        script.panels.retain(|panel| panels.contains(&panel.id));
    }
    script
}

fn event_sink(cfg: &AppConfig) -> Box<dyn EventSink> {
    match &cfg.logging.path {
        Some(path) => {
            let mut logger = JsonlLogger::new(path);
            logger.max_payload_bytes = cfg.logging.max_payload_bytes;
            Box::new(logger)
        }
        None => Box::new(NullSink),
    }
}
