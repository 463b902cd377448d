use clap::Parser;
use std::path::PathBuf;

/// Command-line interface for the usage dashboard.
#[derive(Debug, Parser)]
#[command(author, version, about = "Local read-only dashboard over Claude Code usage records", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file (defaults to ./claude-dash.toml if present).
    #[arg(long, value_name = "FILE")]
    pub config_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_optional() {
        let cli = Cli::try_parse_from(["claude-dash"]).unwrap();
        assert!(cli.config_path.is_none());

        let cli = Cli::try_parse_from(["claude-dash", "--config-path", "dash.toml"]).unwrap();
        assert_eq!(cli.config_path, Some(PathBuf::from("dash.toml")));
    }
}
