use std::{env, process};

use docopt::Docopt;
use serde::Deserialize;

use prices::{CliError, CliResult, cmd, util, werr};

static USAGE: &str = r#"
Prices: CSV price ingestion and lookup.

Usage:
    prices <command> [<args>...]
    prices (-h | --help)
    prices --version

Commands:
    watch     Watch a directory for price CSV files and load them into storage
    serve     Serve the read-only price lookup API
    testdata  Generate a CSV file of random price rows

Options:
    -h, --help    Display this message
    --version     Print version info and exit
"#;

#[derive(Deserialize)]
struct Args {
    arg_command: Option<Command>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Command {
    Watch,
    Serve,
    Testdata,
}

impl Command {
    fn run(self) -> CliResult<()> {
        let argv: Vec<String> = env::args().collect();
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        match self {
            Command::Watch => cmd::watch::run(&argv),
            Command::Serve => cmd::serve::run(&argv),
            Command::Testdata => cmd::testdata::run(&argv),
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();
    let _logger = match flexi_logger::Logger::try_with_env_or_str("info")
        .and_then(flexi_logger::Logger::start)
    {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("warning: can't init logger: {err}");
            None
        },
    };

    let args: Args = Docopt::new(USAGE)
        .and_then(|d| {
            d.options_first(true)
                .version(Some(util::version()))
                .deserialize()
        })
        .unwrap_or_else(|e| e.exit());

    let Some(command) = args.arg_command else {
        werr!("{}", USAGE.trim());
        process::exit(2);
    };

    match command.run() {
        Ok(()) => {},
        Err(CliError::Flag(err)) => err.exit(),
        Err(CliError::IncorrectUsage(msg)) => {
            werr!("usage error: {msg}");
            process::exit(2);
        },
        Err(err) => {
            werr!("error: {err}");
            process::exit(1);
        },
    }
}
