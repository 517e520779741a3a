/// CLI argument parsing and command handling - Gateway
mod args;
mod commands;

pub use args::{Artifact, Cli, Commands, OutputFormat};
pub use commands::{
    build_dashboard, format_report, handle_command, open_backend, resolve_artifacts,
    ArtifactReport, ResolveReport,
};
