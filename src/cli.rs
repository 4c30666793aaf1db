use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "asus-helper",
    about = "Power management helper for ASUS laptops - one view over asusctl, supergfxctl, ryzenadj and nvidia-smi",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output as JSON instead of formatted text
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Alternate config file (default: ~/.config/asus-helper/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show each tool's availability and current state
    Status,

    /// Apply a named profile across all available tools
    Apply {
        /// Profile name (default: the current profile)
        profile: Option<String>,
    },

    /// List configured profiles
    Profiles,

    /// Apply a single setting immediately (e.g. `set cpu_tdp 45`)
    Set { key: String, value: String },

    /// Run as the resident instance: holds the single-instance lock and
    /// processes line commands (set/apply/status/quit) with debouncing
    Run,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (auto-detected if omitted)
        shell: Option<Shell>,
    },
}

/// Print shell completions to stdout.
pub fn print_completions(shell: Option<Shell>) {
    let shell = shell.or_else(Shell::from_env).unwrap_or_else(|| {
        eprintln!(
            "Could not detect shell. Specify one: asus-helper completions bash|zsh|fish|elvish|powershell"
        );
        std::process::exit(1);
    });
    clap_complete::generate(
        shell,
        &mut Cli::command(),
        "asus-helper",
        &mut std::io::stdout(),
    );
}
