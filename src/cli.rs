//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{AppConfig, WebmailConfig};
use crate::error::{ConfigError, Error, Result};
use crate::export;
use crate::membership::{EasyVereinClient, MemberDirectory};
use crate::sync::report::render_sync_report;
use crate::sync::{SyncOptions, Synchronizer};
use crate::webmail::WebmailSession;

/// Keep webmail forwarding rules in line with the member directory
#[derive(Debug, Parser)]
#[command(name = "forward-sync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    pub env: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compare members with forwarding rules and optionally apply the difference
    Sync(SyncArgs),

    /// Write active member addresses to a file
    Export(ExportArgs),

    /// Compare active member addresses with a list in a file
    Compare(CompareArgs),

    /// Check connectivity to the membership API and the webmail
    Test(TestArgs),
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Create and delete rules (default is a dry run)
    #[arg(long)]
    pub apply: bool,

    /// Also delete rules of former members (only with --apply)
    #[arg(long)]
    pub allow_delete: bool,

    /// Show the browser window
    #[arg(long)]
    pub no_headless: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Export member details as CSV instead of a plain address list
    #[arg(long)]
    pub csv: bool,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// File with one address per line
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct TestArgs {
    /// Only test the webmail login
    #[arg(long)]
    pub strato_only: bool,

    /// Show the browser window
    #[arg(long)]
    pub no_headless: bool,
}

/// How a command ended when nothing aborted it early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// An apply run finished but some rules could not be changed.
    PartialFailure,
    /// At least one connectivity check failed.
    CheckFailed,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::CheckFailed => 1,
            Self::PartialFailure => 2,
        }
    }
}

/// Run the selected subcommand.
pub async fn execute(command: Commands, config: AppConfig) -> Result<Outcome> {
    match command {
        Commands::Sync(args) => sync(args, config).await,
        Commands::Export(args) => export_members(args, config).await,
        Commands::Compare(args) => compare(args, config).await,
        Commands::Test(args) => test_connections(args, config).await,
    }
}

fn require_webmail(
    config: AppConfig,
    no_headless: bool,
) -> std::result::Result<WebmailConfig, ConfigError> {
    let mut webmail = config.webmail.ok_or_else(|| ConfigError::MissingRequired {
        key: "STRATO_EMAIL / STRATO_PASSWORD".into(),
        hint: "Both are needed to access the webmail".into(),
    })?;
    if no_headless {
        webmail.headless = false;
    }
    Ok(webmail)
}

async fn sync(args: SyncArgs, config: AppConfig) -> Result<Outcome> {
    let directory = EasyVereinClient::new(config.membership.clone())?;
    let webmail = require_webmail(config, args.no_headless)?;
    let options = SyncOptions {
        apply: args.apply,
        allow_delete: args.allow_delete,
    };

    let mut session = WebmailSession::connect(webmail).await?;
    let result = Synchronizer::new(&directory, &mut session, options)
        .run()
        .await;
    session.close().await;

    let report = result?;
    print!("{}", render_sync_report(&report));

    if report.has_failures() {
        Ok(Outcome::PartialFailure)
    } else {
        Ok(Outcome::Success)
    }
}

async fn export_members(args: ExportArgs, config: AppConfig) -> Result<Outcome> {
    let client = EasyVereinClient::new(config.membership)?;
    let now = chrono::Local::now();

    let path = if args.csv {
        let records = client.fetch_member_records().await?;
        let path = args.output.unwrap_or_else(|| export::default_csv_path(now));
        export::write_member_csv(&path, &records).await?;
        path
    } else {
        let emails = client.fetch_active_emails().await?;
        let path = args.output.unwrap_or_else(|| export::default_txt_path(now));
        export::write_email_list(&path, &emails, now).await?;
        path
    };

    eprintln!("Export written to {}", path.display());
    Ok(Outcome::Success)
}

async fn compare(args: CompareArgs, config: AppConfig) -> Result<Outcome> {
    let client = EasyVereinClient::new(config.membership)?;
    let desired = client.fetch_active_emails().await?;
    let diff = export::compare_with_file(desired, &args.file).await?;
    print!("{}", export::render_compare_report(&diff, &args.file));
    Ok(Outcome::Success)
}

/// One connectivity check and what it reported.
#[derive(Debug)]
struct CheckResult {
    name: &'static str,
    /// Short detail on success.
    outcome: Result<String>,
}

/// Run every applicable check. A failing check does not stop the next one.
async fn run_checks(args: &TestArgs, config: AppConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if !args.strato_only {
        let outcome = async {
            let client = EasyVereinClient::new(config.membership.clone())?;
            let count = client.check_connection().await?;
            Ok::<_, Error>(format!("{count} members"))
        }
        .await;
        results.push(CheckResult {
            name: "Membership API",
            outcome,
        });
    }

    if config.webmail.is_none() && !args.strato_only {
        eprintln!("Webmail: skipped (STRATO_EMAIL / STRATO_PASSWORD not set)");
        return results;
    }

    let outcome = async {
        let webmail = require_webmail(config, args.no_headless)?;
        let account = webmail.email.clone();
        WebmailSession::check_login(webmail).await?;
        Ok::<_, Error>(account)
    }
    .await;
    results.push(CheckResult {
        name: "Webmail login",
        outcome,
    });
    results
}

async fn test_connections(args: TestArgs, config: AppConfig) -> Result<Outcome> {
    let mut failed = false;
    for check in run_checks(&args, config).await {
        match check.outcome {
            Ok(detail) => eprintln!("{}: OK ({detail})", check.name),
            Err(e) => {
                failed = true;
                tracing::error!(check = check.name, error = %e, "Connection check failed");
                eprintln!("{}: FAILED ({e})", check.name);
            }
        }
    }

    if failed {
        Ok(Outcome::CheckFailed)
    } else {
        Ok(Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::config::MembershipConfig;
    use crate::error::{MembershipError, WebmailError};

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_flags() {
        let cli = Cli::try_parse_from([
            "forward-sync",
            "--debug",
            "sync",
            "--apply",
            "--allow-delete",
        ])
        .unwrap();
        assert!(cli.debug);
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert!(args.apply);
        assert!(args.allow_delete);
        assert!(!args.no_headless);
    }

    #[test]
    fn test_global_env_after_subcommand() {
        let cli = Cli::try_parse_from([
            "forward-sync",
            "export",
            "--csv",
            "-o",
            "out.csv",
            "--env",
            "prod.env",
        ])
        .unwrap();
        assert_eq!(cli.env, Some(PathBuf::from("prod.env")));
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert!(args.csv);
        assert_eq!(args.output, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn test_compare_needs_file() {
        assert!(Cli::try_parse_from(["forward-sync", "compare"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::CheckFailed.exit_code(), 1);
        assert_eq!(Outcome::PartialFailure.exit_code(), 2);
    }

    // Port 9 (discard) serves neither the membership API nor WebDriver.
    fn unreachable_config(with_webmail: bool) -> AppConfig {
        let mut membership = MembershipConfig::new("key");
        membership.api_url = "http://127.0.0.1:9".into();
        let webmail = with_webmail.then(|| {
            let mut webmail = WebmailConfig::new("box@club.de", "pw");
            webmail.webdriver_url = "http://127.0.0.1:9".into();
            webmail
        });
        AppConfig {
            membership,
            webmail,
        }
    }

    fn test_args(strato_only: bool) -> TestArgs {
        TestArgs {
            strato_only,
            no_headless: false,
        }
    }

    #[tokio::test]
    async fn test_webmail_checked_after_membership_failure() {
        let results = run_checks(&test_args(false), unreachable_config(true)).await;
        let names: Vec<&str> = results.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Membership API", "Webmail login"]);
        assert!(matches!(
            results[0].outcome,
            Err(Error::Membership(MembershipError::Network(_)))
        ));
        assert!(matches!(
            results[1].outcome,
            Err(Error::Webmail(WebmailError::BrowserUnavailable { .. }))
        ));

        let outcome = test_connections(test_args(false), unreachable_config(true))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::CheckFailed);
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_missing_webmail_credentials_skip_login_check() {
        let results = run_checks(&test_args(false), unreachable_config(false)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Membership API");
    }

    #[tokio::test]
    async fn test_strato_only_without_credentials_fails() {
        let outcome = test_connections(test_args(true), unreachable_config(false))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::CheckFailed);
    }
}
