//! REPL line parsing

use std::path::PathBuf;

use anyhow::{bail, Result};

/// One line typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Anything that isn't a slash command
    Ask(String),
    Upload(Vec<PathBuf>),
    Stage(Vec<PathBuf>),
    CancelUpload,
    UploadStaged,
    Docs,
    ClearDocs,
    /// Show the current model, or switch to the given one
    Model(Option<String>),
    Models,
    Templates,
    Template(String),
    Clear,
    Cancel,
    History,
    Help,
    Quit,
    /// Blank line
    Empty,
}

pub const HELP: &str = "\
Commands:
  /upload <path>...    upload PDFs now
  /stage <path>...     select PDFs to upload later
  /send                upload the staged PDFs
  /cancel-upload       drop the staged PDFs
  /docs                list uploaded and staged documents
  /clear-docs          delete all uploaded documents
  /model [id]          show or switch the chat model
  /models              list known models
  /templates           list canned prompts
  /template <name>     ask a canned prompt
  /clear               clear the chat history
  /cancel              stop the answer in progress
  /history             print the conversation so far
  /help                show this help
  /quit                leave
Anything else is sent as a question.";

pub fn parse_line(line: &str) -> Result<Command> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Ask(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    let command = match name {
        "upload" => Command::Upload(paths(name, &args)?),
        "stage" => Command::Stage(paths(name, &args)?),
        "send" => no_args(name, &args, Command::UploadStaged)?,
        "cancel-upload" => no_args(name, &args, Command::CancelUpload)?,
        "docs" => no_args(name, &args, Command::Docs)?,
        "clear-docs" => no_args(name, &args, Command::ClearDocs)?,
        "model" => match args.as_slice() {
            [] => Command::Model(None),
            [id] => Command::Model(Some(id.to_string())),
            _ => bail!("/model takes at most one model id"),
        },
        "models" => no_args(name, &args, Command::Models)?,
        "templates" => no_args(name, &args, Command::Templates)?,
        "template" => match args.as_slice() {
            [template] => Command::Template(template.to_string()),
            _ => bail!("usage: /template <name>"),
        },
        "clear" => no_args(name, &args, Command::Clear)?,
        "cancel" => no_args(name, &args, Command::Cancel)?,
        "history" => no_args(name, &args, Command::History)?,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "" => bail!("empty command, try /help"),
        other => bail!("unknown command '/{}', try /help", other),
    };
    Ok(command)
}

fn paths(name: &str, args: &[&str]) -> Result<Vec<PathBuf>> {
    if args.is_empty() {
        bail!("usage: /{} <path>...", name);
    }
    Ok(args.iter().map(PathBuf::from).collect())
}

fn no_args(name: &str, args: &[&str], command: Command) -> Result<Command> {
    if !args.is_empty() {
        bail!("/{} takes no arguments", name);
    }
    Ok(command)
}
