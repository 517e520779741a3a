use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "insight-cache")]
#[command(version)]
#[command(about = "Cached AI insights for a task board", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub output_format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve dashboard artifacts for a task file, generating only on change
    Resolve {
        /// JSON task file
        #[arg(short, long)]
        tasks: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Artifact::All)]
        artifact: Artifact,

        /// Serve the stored value instead of waiting on a running generation
        #[arg(long)]
        stale_while_pending: bool,
    },
    /// Print the fingerprint a task file has for each artifact
    Fingerprint {
        #[arg(short, long)]
        tasks: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Artifact::All)]
        artifact: Artifact,
    },
    /// Show stored entries without generating
    Show {
        #[arg(short, long, value_enum, default_value_t = Artifact::All)]
        artifact: Artifact,
    },
    /// Remove stored entries
    Clear {
        #[arg(short, long, value_enum, default_value_t = Artifact::All)]
        artifact: Artifact,
    },
    /// Print board counts for a task file
    Summary {
        #[arg(short, long)]
        tasks: PathBuf,
    },
    /// Check configuration, cache directory and model proxy
    Status,
    /// Initialize configuration
    Init,
}

/// Which cached artifact a command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Artifact {
    /// Board executive summary
    Insight,
    /// Greeting message and mood
    Mood,
    /// Both
    All,
}

impl Artifact {
    pub fn includes_insight(self) -> bool {
        matches!(self, Artifact::Insight | Artifact::All)
    }

    pub fn includes_mood(self) -> bool {
        matches!(self, Artifact::Mood | Artifact::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON structured output
    Json,
}
