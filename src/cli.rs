use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pdfchat::settings::EmbedderKind;

#[derive(Debug, Parser)]
#[command(name = "pdfchat", about = "Ask questions about your PDFs from the terminal")]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the registered PDFs
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },
    /// Ask a single question about the enabled PDFs
    Ask(AskArgs),
    /// Start an interactive conversation
    Chat(ChatArgs),
    /// Manage saved conversations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Read text aloud
    Speak(SpeakArgs),
    /// Show system status
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Documents --

#[derive(Debug, Subcommand)]
pub enum DocAction {
    /// Register a PDF, or every PDF under a directory
    Add {
        /// Path to a PDF file or a directory
        path: PathBuf,
    },
    /// Include a document in the knowledge base
    Enable {
        /// Document file name
        name: String,
    },
    /// Exclude a document from the knowledge base
    Disable {
        /// Document file name
        name: String,
    },
    /// Forget a document
    Remove {
        /// Document file name
        name: String,
    },
    /// List registered documents
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Ask / Chat --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub question: String,

    /// Continue a saved conversation instead of starting a new one
    #[arg(long)]
    pub resume: Option<String>,

    /// Read the answer aloud
    #[arg(long)]
    pub speak: bool,
}

#[derive(Debug, Parser)]
pub struct ChatArgs {
    /// Continue a saved conversation
    #[arg(long)]
    pub resume: Option<String>,
}

// -- History --

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// List saved conversations, newest first
    List,
    /// Print a saved conversation
    Show {
        /// Transcript file name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved conversation
    Delete {
        /// Transcript file name
        name: String,
    },
}

// -- Settings --

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Show the current settings (the API key is masked)
    Show,
    /// Change one or more settings
    Set(SettingsSetArgs),
    /// Clear the stored settings (revert to environment and defaults)
    Reset,
}

#[derive(Debug, Parser)]
pub struct SettingsSetArgs {
    /// Gemini API key
    #[arg(long)]
    pub api_key: Option<String>,

    /// Chat model name
    #[arg(long)]
    pub model: Option<String>,

    /// Embedding backend
    #[arg(long, value_enum)]
    pub embedder: Option<EmbedderKind>,
}

// -- Speak --

#[derive(Debug, Parser)]
pub struct SpeakArgs {
    /// Text to read aloud
    pub text: String,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(self.shell, &mut cmd, "pdfchat", &mut std::io::stdout());
    }
}
