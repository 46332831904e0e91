//! Command-line interface definitions for the Lux scraper.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials and the deployment environment can also come from environment
//! variables.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for the Lux scraper.
///
/// # Examples
///
/// ```sh
/// # Continuous mode against the local JSON store
/// lux_scraper daemon --data-dir ./data
///
/// # One batch pass, skipping startup jitter
/// lux_scraper --store supabase run --now
///
/// # Print what one source yields right now
/// lux_scraper probe --source "Hacker News"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Optional path to a YAML tuning file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Where articles are persisted
    #[arg(long, value_enum, default_value_t = StoreKind::File, global = true)]
    pub store: StoreKind,

    /// Directory for the file store snapshot
    #[arg(short, long, default_value = "./data", global = true)]
    pub data_dir: String,

    #[arg(long, env = "SUPABASE_URL", global = true)]
    pub supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true, global = true)]
    pub supabase_key: Option<String>,

    /// Resend API key for alert emails
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true, global = true)]
    pub resend_api_key: Option<String>,

    /// Recipient of alert emails
    #[arg(long, env = "ALERT_EMAIL", global = true)]
    pub alert_email: Option<String>,

    /// Deployment environment; `production` enables batch startup jitter
    #[arg(long, env = "SCRAPER_ENV", default_value = "development", global = true)]
    pub environment: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scrape forever, picking sources at random and deep-scraping as it goes
    Daemon,
    /// Scrape every source once, then sync
    Run {
        /// Start immediately instead of waiting a random startup delay
        #[arg(long)]
        now: bool,
    },
    /// Scrape one source (or all) and print the result as JSON without persisting
    Probe {
        #[arg(short, long)]
        source: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Supabase,
}

impl Cli {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["lux_scraper", "--data-dir", "/srv/lux", "daemon"]);

        assert_eq!(cli.command, Command::Daemon);
        assert_eq!(cli.data_dir, "/srv/lux");
        assert_eq!(cli.store, StoreKind::File);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "lux_scraper",
            "run",
            "--now",
            "--store",
            "supabase",
            "--environment",
            "Production",
        ]);

        assert_eq!(cli.command, Command::Run { now: true });
        assert_eq!(cli.store, StoreKind::Supabase);
        assert!(cli.is_production());
    }

    #[test]
    fn test_probe_source() {
        let cli = Cli::parse_from(["lux_scraper", "probe", "-s", "Jing Daily"]);
        assert_eq!(
            cli.command,
            Command::Probe {
                source: Some("Jing Daily".to_string())
            }
        );
        assert!(Cli::try_parse_from(["lux_scraper", "--store", "postgres", "daemon"]).is_err());
    }
}
