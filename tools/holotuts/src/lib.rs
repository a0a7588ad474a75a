pub mod config;
pub mod display;
pub mod document_writer;
pub mod errors;
pub mod log_retention;
pub mod logging;
pub mod providers;
pub mod runtime;
pub mod scene;
pub mod tutorial_store;
pub mod types;

use clap::{error::ErrorKind, ArgGroup, Parser, ValueEnum};
use config::{load_config, CliOverrides};
use display::{step_label, tutorial_label};
use errors::HoloTutsError;
use logging::{append_run_log, init_run_log, shutdown_run_log, JsonlLogger};
use runtime::{ProductionRuntime, Terminal};
use serde_json::json;
use std::sync::Arc;
use tutorial_store::{StoreOptions, TutorialStore};
use types::StepIdPolicy;

#[derive(Debug, Clone, Parser)]
#[command(name = "holotuts")]
#[command(about = "Inspect and maintain a HoloLens tutorial store")]
#[command(version)]
#[command(group(
    ArgGroup::new("command")
        .args(["list", "show", "delete_step", "delete_tutorial", "reset"])
        .multiple(false)
))]
pub struct Cli {
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    #[arg(long)]
    pub data_dir: Option<std::path::PathBuf>,
    #[arg(long, value_enum)]
    pub step_ids: Option<CliStepIds>,
    #[arg(long, default_value_t = false)]
    pub list: bool,
    #[arg(long, value_name = "TUTORIAL")]
    pub show: Option<String>,
    #[arg(long, value_name = "STEP")]
    pub delete_step: Option<String>,
    #[arg(long, value_name = "TUTORIAL")]
    pub delete_tutorial: Option<String>,
    #[arg(long, default_value_t = false)]
    pub reset: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliStepIds {
    Stable,
    Renumber,
}

impl From<CliStepIds> for StepIdPolicy {
    fn from(value: CliStepIds) -> Self {
        match value {
            CliStepIds::Stable => StepIdPolicy::Stable,
            CliStepIds::Renumber => StepIdPolicy::Renumber,
        }
    }
}

pub fn run() -> Result<i32, HoloTutsError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| HoloTutsError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
) -> Result<i32, HoloTutsError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(HoloTutsError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        data_dir: cli.data_dir.clone(),
        step_ids: cli.step_ids.map(Into::into),
    };
    let (cfg, paths) = load_config(&overrides, cwd, runtime.file_system.as_ref())?;

    init_run_log(JsonlLogger {
        path: paths.log_path.clone(),
        max_payload_bytes: cfg.logging.max_payload_bytes,
        budget_bytes: cfg.logging.budget_bytes,
    });
    append_run_log(
        "info",
        "cli.start",
        json!({
            "document": paths.document_path.display().to_string(),
            "step_ids": cfg.storage.step_ids.as_str(),
        }),
    );

    let result = execute(&cli, &cfg, &paths, runtime);
    if let Err(error) = &result {
        append_run_log("error", "cli.failed", json!({ "error": error.to_string() }));
    }
    let _ = shutdown_run_log();
    result
}

fn execute(
    cli: &Cli,
    cfg: &config::AppConfig,
    paths: &types::SessionPaths,
    runtime: &ProductionRuntime,
) -> Result<i32, HoloTutsError> {
    let mut store = TutorialStore::load(
        StoreOptions::from_config(cfg, paths),
        Arc::clone(&runtime.file_system),
    )?;
    append_run_log(
        "info",
        "cli.store_ready",
        json!({
            "tutorials": store.tutorials().len(),
            "step_ids": store.step_id_policy().as_str(),
        }),
    );
    let terminal = runtime.terminal.as_ref();

    if let Some(tutorial_id) = &cli.show {
        let tutorial = store.tutorial(tutorial_id)?;
        terminal.write_line(&tutorial_label(tutorial))?;
        for step in &tutorial.steps {
            let video = step.video_file_path.as_deref().unwrap_or("no video");
            terminal.write_line(&format!("  {} [{}] {video}", step_label(step), step.id))?;
        }
        return Ok(0);
    }

    if let Some(step_id) = &cli.delete_step {
        let removed = store.delete_step(step_id)?;
        store.flush()?;
        terminal.write_line(&format!(
            "deleted {} ({})",
            removed.step.name, removed.step.id
        ))?;
        return Ok(0);
    }

    if let Some(tutorial_id) = &cli.delete_tutorial {
        let removed = store.delete_tutorial(tutorial_id)?;
        store.flush()?;
        terminal.write_line(&format!(
            "deleted {} and {} step(s)",
            removed.name,
            removed.steps.len()
        ))?;
        return Ok(0);
    }

    if cli.reset {
        let removed = store.delete_all()?;
        store.flush()?;
        terminal.write_line(&format!("reset: removed {removed} tutorial(s)"))?;
        return Ok(0);
    }

    list_tutorials(&store, terminal)?;
    Ok(0)
}

fn list_tutorials(store: &TutorialStore, terminal: &dyn Terminal) -> Result<(), HoloTutsError> {
    if store.tutorials().is_empty() {
        return terminal.write_line("no tutorials");
    }
    for tutorial in store.tutorials() {
        terminal.write_line(&format!("{} {}", tutorial.id, tutorial_label(tutorial)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{FakeClock, FakeFileSystem, FakeTerminal};
    use std::ffi::OsString;
    use std::path::Path;

    fn fake_runtime(fs: &FakeFileSystem, terminal: &FakeTerminal) -> ProductionRuntime {
        ProductionRuntime {
            clock: Arc::new(FakeClock::default()),
            file_system: Arc::new(fs.clone()),
            terminal: Arc::new(terminal.clone()),
        }
    }

    fn args(list: &[&str]) -> Vec<OsString> {
        std::iter::once("holotuts")
            .chain(list.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn list_on_fresh_store_creates_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().display().to_string();
        let fs = FakeFileSystem::default();
        let terminal = FakeTerminal::new();
        let code = run_with_runtime(
            &args(&["--data-dir", &data_dir, "--list"]),
            Path::new("/work"),
            &fake_runtime(&fs, &terminal),
        )
        .expect("run");
        assert_eq!(code, 0);
        assert_eq!(terminal.written_lines(), vec!["no tutorials".to_string()]);
        assert!(fs.file(dir.path().join("tutorials.json")).is_some());
    }

    #[test]
    fn commands_are_mutually_exclusive() {
        let fs = FakeFileSystem::default();
        let terminal = FakeTerminal::new();
        let err = run_with_runtime(
            &args(&["--list", "--reset"]),
            Path::new("/work"),
            &fake_runtime(&fs, &terminal),
        )
        .expect_err("conflict");
        assert!(matches!(err, HoloTutsError::Cli(_)));
    }

    #[test]
    fn show_unknown_tutorial_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().display().to_string();
        let fs = FakeFileSystem::default();
        let terminal = FakeTerminal::new();
        let err = run_with_runtime(
            &args(&["--data-dir", &data_dir, "--show", "tutorial_9"]),
            Path::new("/work"),
            &fake_runtime(&fs, &terminal),
        )
        .expect_err("missing");
        assert!(matches!(err, HoloTutsError::NotFound(message) if message.contains("tutorial_9")));
    }
}
