use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands::audit::AuditOptions;
use crate::commands::delete::DeleteOptions;
use crate::commands::override_cmd::{OverrideChoice, OverrideOptions};
use crate::commands::restore::RestoreOptions;
use crate::commands::scan::ScanCommandOptions;
use crate::commands::stage::StageOptions;
use crate::commands::staged::StagedOptions;
use crate::commands::{self, CommandReport};
use crate::logging;
use crate::sweep::paths::resolve_paths;

/// Reconcile a backups directory against ITSM records and stage, delete or
/// restore folders with an audit trail.
#[derive(Parser, Debug)]
#[command(name = "hdcs-backups")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Print the report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging on stderr (HDCS_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pass and show every folder's disposition
    Scan(ScanArgs),

    /// Move confirmed folders into the staging root
    Stage(StageArgs),

    /// Permanently remove folders from the staging root
    Delete(DeleteArgs),

    /// Move staged folders back into the backups root
    Restore(RestoreArgs),

    /// List the staging root
    Staged(StagedArgs),

    /// Store a decision that later passes reapply
    Override(OverrideArgs),

    /// Show one day of audit records
    Audit(AuditArgs),

    /// Show paths, configuration and environment overrides
    Status,
}

#[derive(Args, Debug)]
pub struct PassArgs {
    /// Read records from a JSON file instead of the ITSM instance
    #[arg(long, env = "HDCS_RECORDS_FILE")]
    pub records: Option<PathBuf>,

    /// Compute recursive folder sizes
    #[arg(long)]
    pub size: bool,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub pass: PassArgs,
}

#[derive(Args, Debug)]
pub struct StageArgs {
    #[command(flatten)]
    pub pass: PassArgs,

    /// Move the folders; without this only candidates are listed
    #[arg(long)]
    pub yes: bool,

    /// Limit staging to these folders
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,

    /// Never stage this folder in this pass
    #[arg(long = "keep", value_name = "NAME")]
    pub keep: Vec<String>,

    /// Stage this folder whatever its disposition
    #[arg(long = "force", value_name = "NAME")]
    pub force: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Staged folder names
    #[arg(value_name = "NAME", conflicts_with = "all")]
    pub names: Vec<String>,

    /// Every folder in the staging root
    #[arg(long)]
    pub all: bool,

    /// Delete for real; without this only the plan is shown
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Staged folder names
    #[arg(value_name = "NAME", required = true)]
    pub names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct StagedArgs {
    /// Compute recursive folder sizes
    #[arg(long)]
    pub size: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OverrideArg {
    Keep,
    Delete,
    Confirm,
    Clear,
}

#[derive(Args, Debug)]
pub struct OverrideArgs {
    /// Folder name in the backups root
    pub name: String,

    #[arg(value_enum)]
    pub decision: OverrideArg,

    /// Read records from a JSON file instead of the ITSM instance
    #[arg(long, env = "HDCS_RECORDS_FILE")]
    pub records: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Day to show, YYYY-MM-DD (defaults to today)
    #[arg(long)]
    pub date: Option<String>,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{}: {}",
        report.command,
        if report.ok { "ok" } else { "issues found" }
    );
    for detail in &report.details {
        println!("  {detail}");
    }
    if !report.issues.is_empty() {
        println!("issues:");
        for issue in &report.issues {
            println!("  - {issue}");
        }
    }
    Ok(())
}

fn dispatch(command: Commands) -> Result<CommandReport> {
    match command {
        Commands::Scan(args) => commands::scan::run(&ScanCommandOptions {
            records: args.pass.records,
            size: args.pass.size,
        }),
        Commands::Stage(args) => commands::stage::run(&StageOptions {
            records: args.pass.records,
            size: args.pass.size,
            yes: args.yes,
            only: args.only,
            keep: args.keep,
            force: args.force,
        }),
        Commands::Delete(args) => commands::delete::run(&DeleteOptions {
            names: args.names,
            all: args.all,
            yes: args.yes,
        }),
        Commands::Restore(args) => commands::restore::run(&RestoreOptions { names: args.names }),
        Commands::Staged(args) => commands::staged::run(&StagedOptions { size: args.size }),
        Commands::Override(args) => commands::override_cmd::run(&OverrideOptions {
            name: args.name,
            choice: match args.decision {
                OverrideArg::Keep => OverrideChoice::Keep,
                OverrideArg::Delete => OverrideChoice::Delete,
                OverrideArg::Confirm => OverrideChoice::Confirm,
                OverrideArg::Clear => OverrideChoice::Clear,
            },
            records: args.records,
        }),
        Commands::Audit(args) => commands::audit::run(&AuditOptions { date: args.date }),
        Commands::Status => commands::status::run(),
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = resolve_paths()?;
    let _log_guards = logging::init(&paths.logs_dir, cli.verbose);

    let report = dispatch(cli.command)?;
    print_report(&report, cli.json)?;
    if report.ok {
        Ok(())
    } else {
        Err(anyhow!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        ))
    }
}
