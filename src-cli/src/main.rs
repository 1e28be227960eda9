use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use wordmap_lib::Overrides;

#[derive(Parser, Debug)]
#[command(name = "wordmap")]
#[command(about = "Chat with your PDFs from the terminal", version)]
struct Args {
    /// Data directory (default: platform data dir/wordmap)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible chat API
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model to start the session with
    #[arg(long, global = true)]
    model: Option<String>,

    /// Pause between revealed characters, in milliseconds
    #[arg(long, global = true)]
    reveal_delay_ms: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Ask one question about some PDFs and exit
    Ask {
        /// PDF to upload before asking (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Print the final session state as JSON
        #[arg(long)]
        json: bool,

        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// List known models
    Models,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        wordmap_lib::init_logging(&["wordmap=debug", "wordmap_lib=debug", "wordmap_core=debug"]);
    } else {
        wordmap_lib::init_logging(&["wordmap=info", "wordmap_lib=info", "wordmap_core=info"]);
    }

    let overrides = Overrides {
        data_dir: args.data_dir,
        base_url: args.base_url,
        model: args.model,
        reveal_delay_ms: args.reveal_delay_ms,
    };

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => wordmap_lib::run_chat(overrides),
        Commands::Ask {
            files,
            json,
            question,
        } => wordmap_lib::run_ask(overrides, files, question.join(" "), json),
        Commands::Models => wordmap_lib::run_models(),
    }
}
