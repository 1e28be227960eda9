//! Interactive chat loop

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use wordmap_core::{models, templates, ChatError, Session, Settings, TurnStatus, UploadFile};

use crate::commands::{parse_line, Command, HELP};
use crate::render::TranscriptRenderer;

/// Run the REPL until `/quit`, end of input, or Ctrl+C with nothing to cancel
pub async fn run(session: Arc<Session>, settings_file: &Path) -> Result<()> {
    let renderer = spawn_renderer(&session);

    println!("Word Map chat. Model: {}", session.snapshot().selected_model);
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                if session.cancel_turn().await {
                    continue;
                }
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        if command == Command::Quit {
            break;
        }
        execute(&session, command, settings_file).await;
    }

    renderer.abort();
    Ok(())
}

fn spawn_renderer(session: &Session) -> tokio::task::JoinHandle<()> {
    let mut snapshots = WatchStream::new(session.subscribe());
    tokio::spawn(async move {
        let mut renderer = TranscriptRenderer::new();
        while let Some(state) = snapshots.next().await {
            let result = {
                let mut out = std::io::stdout().lock();
                renderer.render(&state, &mut out)
            };
            if let Err(e) = result {
                tracing::warn!("Failed to draw transcript: {}", e);
                break;
            }
        }
    })
}

async fn execute(session: &Arc<Session>, command: Command, settings_file: &Path) {
    match command {
        Command::Empty | Command::Quit => {}
        Command::Help => println!("{}", HELP),
        Command::Ask(question) => ask(session, question),
        Command::Template(name) => match templates::get_template(&name) {
            Some(template) => ask(session, template.prompt.to_string()),
            None => eprintln!("{}", ChatError::UnknownTemplate(name)),
        },
        Command::Upload(paths) => {
            let files = read_files(&paths).await;
            if files.is_empty() {
                return;
            }
            match session.upload(files).await {
                Ok(ids) => println!("Uploaded {} document(s)", ids.len()),
                Err(e) => eprintln!("{}", e),
            }
        }
        Command::Stage(paths) => {
            let files = read_files(&paths).await;
            session.stage_files(files).await;
            println!("Staged: {}", session.snapshot().staged.join(", "));
        }
        Command::UploadStaged => match session.upload_staged().await {
            Ok(ids) => println!("Uploaded {} document(s)", ids.len()),
            Err(e) => eprintln!("{}", e),
        },
        Command::CancelUpload => {
            session.cancel_upload().await;
            println!("Staged files dropped");
        }
        Command::Docs => {
            let state = session.snapshot();
            if state.documents.is_empty() {
                println!("No documents uploaded");
            }
            for (i, name) in state.documents.iter().enumerate() {
                println!("{:>3}. {}", i + 1, name);
            }
            if !state.staged.is_empty() {
                println!("Staged: {}", state.staged.join(", "));
            }
        }
        Command::ClearDocs => match session.clear_documents().await {
            Ok(()) => println!("Documents cleared"),
            Err(e) => eprintln!("{}", e),
        },
        Command::Model(None) => println!("{}", session.snapshot().selected_model),
        Command::Model(Some(id)) => match session.select_model(&id).await {
            Ok(()) => {
                save_model(settings_file, &id);
                println!("Model set to {}", id);
            }
            Err(e) => eprintln!("{}", e),
        },
        Command::Models => {
            let selected = session.snapshot().selected_model;
            for model in models::available_models() {
                let marker = if model.id == selected { "*" } else { " " };
                println!("{} {:<36} {}", marker, model.id, model.name);
            }
        }
        Command::Templates => {
            for template in templates::templates() {
                println!("{:<10} {}", template.name, template.title);
            }
        }
        Command::Clear => match session.clear_chat().await {
            Ok(()) => println!("Chat cleared"),
            Err(e) => eprintln!("{}", e),
        },
        Command::Cancel => {
            if !session.cancel_turn().await {
                println!("Nothing to cancel");
            }
        }
        Command::History => {
            for turn in &session.snapshot().chat_history {
                println!("> {}", turn.question);
                match &turn.status {
                    TurnStatus::Failed { error } => println!("  error: {}", error.message),
                    _ => println!("{}", turn.answer),
                }
            }
        }
    }
}

/// Answer in the background so `/cancel` stays available
fn ask(session: &Arc<Session>, question: String) {
    let session = session.clone();
    tokio::spawn(async move {
        match session.submit_question(&question).await {
            Ok(_) => {}
            // Rejected before a turn existed, so the transcript won't show it
            Err(e @ (ChatError::Busy | ChatError::EmptyQuestion)) => eprintln!("{}", e),
            Err(e) => tracing::debug!("Turn failed: {}", e),
        }
    });
}

async fn read_files(paths: &[PathBuf]) -> Vec<UploadFile> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match UploadFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => eprintln!("Skipping {}: {}", path.display(), e),
        }
    }
    files
}

fn save_model(settings_file: &Path, id: &str) {
    let mut settings = Settings::load(settings_file);
    settings.selected_model = Some(id.to_string());
    if let Err(e) = settings.save(settings_file) {
        tracing::warn!("Failed to save settings: {:#}", e);
    }
}
