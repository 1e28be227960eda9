pub mod commands;
pub mod render;
pub mod repl;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};

use wordmap_core::{models, Config, SessionManager, Settings, UploadFile};

/// Initialize tracing/logging with the given directives.
///
/// Logs go to stderr so the transcript on stdout stays readable.
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Command-line values that take precedence over `Config` and `Settings`
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub reveal_delay_ms: Option<u64>,
}

impl Overrides {
    /// Apply to a loaded config. A new data dir moves the uploads and settings with it.
    pub fn apply(&self, config: Config) -> Config {
        let mut config = match &self.data_dir {
            Some(data_dir) => Config {
                base_url: config.base_url,
                api_key_env: config.api_key_env,
                reveal_delay: config.reveal_delay,
                ..Config::with_data_dir(data_dir)
            },
            None => config,
        };
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(ms) = self.reveal_delay_ms {
            config.reveal_delay = Duration::from_millis(ms);
        }
        config
    }

    /// Flag first, then the saved selection, then the default
    pub fn model(&self, config: &Config, settings: &Settings) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| settings.model_or(&config.default_model).to_string())
    }
}

fn load_config(overrides: &Overrides) -> Result<(Config, Settings)> {
    let config = overrides.apply(Config::load_or_default());
    config
        .ensure_dirs()
        .with_context(|| format!("Failed to create data directories under {:?}", config.data_dir))?;
    let settings = Settings::load(&config.settings_file);
    tracing::debug!("Data directory: {:?}", config.data_dir);
    Ok((config, settings))
}

fn block_on<F>(future: F) -> ExitCode
where
    F: std::future::Future<Output = Result<bool>>,
{
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match rt.block_on(future) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Interactive chat
pub fn run_chat(overrides: Overrides) -> ExitCode {
    block_on(chat(overrides))
}

async fn chat(overrides: Overrides) -> Result<bool> {
    let (config, settings) = load_config(&overrides)?;
    let manager = SessionManager::from_config(&config)?;
    manager.purge_stale_uploads().await?;

    let session = manager
        .create_with_model(&overrides.model(&config, &settings))
        .await;
    tracing::info!(session_id = %session.id(), "Starting chat");

    let result = repl::run(session, &config.settings_file).await;
    tracing::info!("Shutting down...");
    let closed = manager.destroy_all().await;

    result?;
    closed?;
    Ok(true)
}

/// Answer one question about the given files and exit
pub fn run_ask(overrides: Overrides, files: Vec<PathBuf>, question: String, json: bool) -> ExitCode {
    block_on(ask(overrides, files, question, json))
}

async fn ask(overrides: Overrides, files: Vec<PathBuf>, question: String, json: bool) -> Result<bool> {
    let (mut config, settings) = load_config(&overrides)?;
    // Only the final answer is printed, so there is nothing to animate
    config.reveal_delay = Duration::ZERO;

    let manager = SessionManager::from_config(&config)?;
    manager.purge_stale_uploads().await?;
    let session = manager
        .create_with_model(&overrides.model(&config, &settings))
        .await;

    let mut uploads = Vec::with_capacity(files.len());
    for path in &files {
        uploads.push(UploadFile::from_path(path).await?);
    }

    let outcome = match session.upload(uploads).await {
        Ok(_) => session.submit_question(&question).await,
        Err(e) => Err(e),
    };
    let state = session.snapshot();
    manager.destroy_all().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to serialize session state")?
        );
    }

    match outcome {
        Ok(turn) => {
            if !json {
                println!("{}", turn.answer);
            }
            Ok(true)
        }
        Err(e) => {
            eprintln!("Error ({}): {}", e.code(), e);
            Ok(false)
        }
    }
}

/// Print the model catalog
pub fn run_models() -> ExitCode {
    for model in models::available_models() {
        println!("{:<36} {}", model.id, model.name);
    }
    ExitCode::SUCCESS
}
