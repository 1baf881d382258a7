static USAGE: &str = r#"
Watch a directory for price CSV files and load them into storage.

Every new .csv file in the watched directory is claimed by renaming it
under a timestamp prefix, so restarts and re-scans never ingest the same
file twice. Files at or over the configured size threshold are first cut
into row chunks that re-enter the directory as regular files. Regular
files are loaded either as parsed row batches or with a bulk file
import, depending on the import_by_lines setting.

Fully loaded files are moved to the processed directory; files that
could not be read or stored are moved to the errors directory. Runs
until interrupted (SIGINT/SIGTERM).

Usage:
    prices watch [options]
    prices watch --help

watch options:
    -c, --config <file>    Path to the TOML config file.
                           [default: configs/prices.toml]

Common options:
    -h, --help             Display this message
"#;

use log::info;
use serde::Deserialize;

use crate::{
    CliError, CliResult, config,
    files::{pipeline, stop_channel},
    repository, util,
};

#[derive(Deserialize)]
struct Args {
    flag_config: String,
}

pub fn run(argv: &[&str]) -> CliResult<()> {
    let args: Args = util::get_args(USAGE, argv)?;
    let config = config::FileProcessor::load(Some(&args.flag_config))?;

    info!(
        "init prices repository for storage driver={}",
        config.storage.driver
    );
    let repo = repository::new_prices(&config.storage)?;

    let (handle, stop) = stop_channel();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        handle.stop();
    })
    .map_err(|err| CliError::Other(format!("can't install signal handler: ({err})")))?;

    pipeline::run(&config, repo, stop)
}
