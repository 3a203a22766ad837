use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use scinv::BackupPolicy;
use tracing_subscriber::EnvFilter;

use scinvctl::cmd_check;
use scinvctl::cmd_set::{self, SetArgs};
use scinvctl::cmd_shell;
use scinvctl::cmd_show;
use scinvctl::cmd_tree;
use scinvctl::cmd_validate;
use scinvctl::common;

#[derive(Parser, Debug)]
#[command(name = "scinvctl", version, about = "SeisComP inventory editor CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    /// Session settings (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backup naming: suffix or timestamped
    #[arg(long, value_parser = common::parse_backup)]
    backup: Option<BackupPolicy>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the node tree
    Tree {
        file: PathBuf,
        /// Start at this node, e.g. network=GE/station=APE
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Print the fields of one node
    Show {
        file: PathBuf,
        #[arg(default_value = "")]
        path: String,
    },
    /// Validate and write one field, then save with a backup
    Set {
        file: PathBuf,
        path: String,
        field: String,
        #[arg(required_unless_present = "clear", allow_negative_numbers = true)]
        value: Option<String>,
        /// Remove an optional field instead
        #[arg(long, conflicts_with = "value")]
        clear: bool,
        /// Save to this file instead of overwriting FILE
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Report bindings, node counts and round-trip fidelity
    Check { file: PathBuf },
    /// Check a value against a field kind (latitude, sample-rate, ...)
    Validate {
        kind: String,
        #[arg(allow_negative_numbers = true)]
        value: String,
    },
    /// Interactive editing session on stdin
    Shell {
        file: PathBuf,
        /// Autosave delay in milliseconds
        #[arg(long)]
        autosave_ms: Option<u64>,
        #[arg(long, conflicts_with = "autosave_ms")]
        no_autosave: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbose,
        json,
        config,
        backup,
        cmd,
    } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = common::load_config(config.as_deref())?;
    if let Some(backup) = backup {
        config.backup = backup;
    }

    match cmd {
        Cmd::Tree { file, path } => cmd_tree::run(&file, &path, json)?,
        Cmd::Show { file, path } => cmd_show::run(&file, &path, json)?,
        Cmd::Set {
            file,
            path,
            field,
            value,
            clear,
            output,
            dry_run,
        } => {
            let args = SetArgs {
                file,
                path,
                field,
                value: if clear { None } else { value },
                output,
                dry_run,
            };
            cmd_set::run(args, &config, json)?
        }
        Cmd::Check { file } => cmd_check::run(&file, json)?,
        Cmd::Validate { kind, value } => cmd_validate::run(&kind, &value, json)?,
        Cmd::Shell {
            file,
            autosave_ms,
            no_autosave,
        } => {
            if no_autosave {
                config.autosave_delay_ms = None;
            } else if autosave_ms.is_some() {
                config.autosave_delay_ms = autosave_ms;
            }
            cmd_shell::run(file, config, json).await?
        }
    };

    Ok(())
}
