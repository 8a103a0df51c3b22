use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "keypool-proxy",
    version,
    about = "HTTP proxy for OpenAI-compatible APIs with a rotating pool of API keys",
    long_about = "Forwards every request to the upstream API with the next healthy key from a pool, retries on another key when one is rate limited or rejected, and quarantines failing keys with exponential backoff."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "KEYPOOL_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Server bind address (overrides config and environment)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (overrides config and environment)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "KEYPOOL_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the proxy server (default)
    Serve,

    /// Validate configuration file
    Config {
        /// Configuration file to validate (defaults to --config)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Show detailed validation output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Key management commands
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum KeyCommands {
    /// Check every configured key against the upstream
    Check {
        /// Number of keys checked in parallel
        #[arg(long, default_value_t = 10)]
        concurrency: usize,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Model to probe; repeat for several. Defaults to a small built-in list.
        #[arg(long = "model", value_name = "MODEL")]
        models: Vec<String>,

        /// Write valid_keys.txt, invalid_keys.txt and duplicate_keys.txt into DIR
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["keypool-proxy"]).unwrap();
        assert_eq!(cli.command(), Commands::Serve);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
    }

    #[test]
    fn parses_keys_check_with_models() {
        let cli = Cli::try_parse_from([
            "keypool-proxy",
            "keys",
            "check",
            "--concurrency",
            "4",
            "--model",
            "gpt-4o-mini",
            "--model",
            "gpt-4.1-nano",
        ])
        .unwrap();
        assert_eq!(
            cli.command(),
            Commands::Keys {
                action: KeyCommands::Check {
                    concurrency: 4,
                    timeout: 30,
                    models: vec!["gpt-4o-mini".into(), "gpt-4.1-nano".into()],
                    output: None,
                }
            }
        );
    }

    #[test]
    fn parses_keys_check_output_dir() {
        let cli = Cli::try_parse_from(["keypool-proxy", "keys", "check", "-o", "out"]).unwrap();
        let Commands::Keys {
            action: KeyCommands::Check { output, .. },
        } = cli.command()
        else {
            panic!("expected keys check");
        };
        assert_eq!(output, Some(PathBuf::from("out")));
    }

    #[test]
    fn host_and_port_override() {
        let cli = Cli::try_parse_from(["keypool-proxy", "--host", "127.0.0.1", "-p", "9000"]).unwrap();
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(9000));
    }
}
