//! zbx-sdb: Zabbix external-check adapter for SequoiaDB.
//!
//! Invoked once per item key by the monitoring agent. Prints exactly one line
//! on stdout: a JSON document or a scalar. Errors go to the log and the
//! process exits non-zero with nothing on stdout.
//!
//! ## Usage
//!
//! - `zbx-sdb discovery_inst coord`: instances flagged `coord`
//! - `zbx-sdb discovery_all_cs`: collection spaces of every instance
//! - `zbx-sdb sdb_prod_sessions sessions`: session aggregate
//! - `zbx-sdb sdb_prod_cs collectionspaces sdb_prod_orders`: one collection space
//! - `zbx-sdb sdb_prod_db snapshot SDB_SNAP_DATABASE`: merged database snapshot
//! - `zbx-sdb sdb_prod_running cached sessions split_type.Agent.Running`: cached field

mod logging;
mod rest_client;

use clap::Parser;
use rest_client::RestConnector;
use sdb_core::{load_config, Invocation, LoggingConfig, ReportCache};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "zbx-sdb")]
#[command(about = "SequoiaDB monitoring adapter for Zabbix")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $ZBX_SDB_CONFIG, then zbx_sdb.toml beside the binary)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Item key, e.g. `sdb_prod_sessions` or `discovery_inst`
    #[arg(value_name = "ITEM")]
    item: String,

    /// Function name followed by its arguments
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref());
    let logging_config = match &config {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig::default(),
    };
    let _logging_guard = logging::init(&logging_config);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let cache = ReportCache::from_config(&config.cache);
    let ctx = Invocation {
        config: &config,
        cache: &cache,
        now: chrono::Local::now().naive_local(),
    };

    let line = sdb_core::run(&ctx, &RestConnector, &cli.item, &cli.args)
        .and_then(|output| output.render());
    match line {
        Ok(line) => {
            println!("{}", line);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, item = %cli.item, args = ?cli.args, "zbx-sdb failed");
            ExitCode::FAILURE
        }
    }
}
