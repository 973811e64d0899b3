use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use shiplog::cache::ResponseCache;
use shiplog::config::Config;
use shiplog::discovery::Scope;
use shiplog::error::ConfigError;
use shiplog::pipeline::{self, GenerateOptions, PipelineOutcome};
use shiplog::report::{self, ReportFormat};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "shiplog",
    about = "Turn the pull requests you merged into a log of shipped features",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover merged pull requests and write a feature report
    Generate(GenerateArgs),
    /// Delete cached GitHub responses
    ClearCache {
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// GitHub username whose pull requests to collect
    #[arg(long)]
    user: String,

    /// First day of the window (YYYY-MM-DD, inclusive)
    #[arg(long, value_parser = parse_date)]
    since: NaiveDate,

    /// Last day of the window (YYYY-MM-DD, inclusive)
    #[arg(long, value_parser = parse_date)]
    until: NaiveDate,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
    format: ReportFormat,

    /// Which repositories count: all, personal, or orgs
    #[arg(long, value_enum, default_value_t = Scope::All)]
    scope: Scope,

    /// Only scan these repositories (comma-separated owner/name)
    #[arg(long, value_delimiter = ',')]
    repos: Vec<String>,

    /// Only these organizations (comma-separated)
    #[arg(long, value_delimiter = ',')]
    orgs: Vec<String>,

    /// Never report these repositories (comma-separated owner/name)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Skip the per-organization repository sweep
    #[arg(long)]
    skip_orgs: bool,

    /// Summarize in batches and skip commit fetching
    #[arg(long)]
    fast: bool,

    /// List discovered pull requests without summarizing them
    #[arg(long)]
    dry_run: bool,

    /// Bypass the response cache
    #[arg(long)]
    no_cache: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl GenerateArgs {
    fn options(&self) -> GenerateOptions {
        let clean = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        };

        GenerateOptions {
            username: self.user.trim().to_string(),
            since: self.since,
            until: self.until,
            scope: self.scope,
            repos: clean(&self.repos),
            orgs: clean(&self.orgs),
            exclude: clean(&self.exclude),
            skip_org_sweep: self.skip_orgs,
            fast: self.fast,
            dry_run: self.dry_run,
            no_cache: self.no_cache,
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ConfigError::InvalidDate(value.to_string()))
}

/// Logs go to stderr so a report on stdout stays clean. `RUST_LOG` wins over
/// the verbosity flag.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("shiplog={}", level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn write_output(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .context("Failed to write report to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let options = args.options();
    let config = Config::from_env();

    match pipeline::run(&config, &options).await? {
        PipelineOutcome::DryRun {
            pull_requests,
            stats,
        } => {
            let listing = report::render_dry_run(
                &options.username,
                options.since,
                options.until,
                &pull_requests,
                &stats,
            );
            write_output(&listing, args.output.as_ref())
        }
        PipelineOutcome::NothingFound { .. } => {
            eprintln!(
                "No merged pull requests by {} between {} and {}.",
                options.username, options.since, options.until
            );
            Ok(())
        }
        PipelineOutcome::Report(report) => {
            let rendered = report::render(&report, args.format)?;
            write_output(&rendered, args.output.as_ref())
        }
    }
}

fn clear_cache() -> Result<()> {
    let Some(dir) = ResponseCache::default_dir() else {
        eprintln!("No home directory; nothing to clear.");
        return Ok(());
    };
    let removed = ResponseCache::new(&dir)
        .clear()
        .with_context(|| format!("Failed to clear cache at {}", dir.display()))?;
    eprintln!("Removed {} cached responses from {}", removed, dir.display());
    Ok(())
}

/// Help and version exit 0. Every other parse failure is a configuration
/// error and exits 1, not clap's default of 2.
fn parse_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn parse_cli<I, T>(args: I) -> Result<Cli, ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| {
        let _ = e.print();
        ExitCode::from(parse_exit_code(e.kind()))
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(cli) => cli,
        Err(code) => return code,
    };

    let result = match cli.command {
        Commands::Generate(args) => {
            init_logging(args.verbose);
            generate(args).await
        }
        Commands::ClearCache { verbose } => {
            init_logging(verbose);
            clear_cache()
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
