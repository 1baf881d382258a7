use std::{fmt, io};

use crate::{config::ConfigError, repository::RepositoryError};

#[macro_export]
macro_rules! werr {
    ($($arg:tt)*) => ({
        use std::io::Write;
        (writeln!(&mut ::std::io::stderr(), $($arg)*)).unwrap();
    });
}

/// Log the error and return it as a `CliError`.
#[macro_export]
macro_rules! fail_clierror {
    ($($t:tt)*) => {{
        use log::error;
        let err = format!($($t)*);
        error!("{err}");
        Err($crate::CliError::Other(err))
    }};
}

#[macro_export]
macro_rules! fail_incorrectusage_clierror {
    ($($t:tt)*) => {{
        use log::error;
        let err = format!($($t)*);
        error!("{err}");
        Err($crate::CliError::IncorrectUsage(err))
    }};
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub enum CliError {
    Flag(docopt::Error),
    Csv(csv::Error),
    Io(io::Error),
    Config(ConfigError),
    Repository(RepositoryError),
    IncorrectUsage(String),
    Other(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Flag(err) => err.fmt(f),
            CliError::Csv(err) => err.fmt(f),
            CliError::Io(err) => err.fmt(f),
            CliError::Config(err) => err.fmt(f),
            CliError::Repository(err) => err.fmt(f),
            CliError::IncorrectUsage(msg) | CliError::Other(msg) => f.write_str(msg),
        }
    }
}

impl From<docopt::Error> for CliError {
    fn from(err: docopt::Error) -> CliError {
        CliError::Flag(err)
    }
}

impl From<csv::Error> for CliError {
    fn from(err: csv::Error) -> CliError {
        if let csv::ErrorKind::Io(v) = err.kind() {
            CliError::Io(io::Error::new(v.kind(), v.to_string()))
        } else {
            CliError::Csv(err)
        }
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> CliError {
        CliError::Io(err)
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> CliError {
        CliError::Config(err)
    }
}

impl From<RepositoryError> for CliError {
    fn from(err: RepositoryError) -> CliError {
        CliError::Repository(err)
    }
}

impl From<String> for CliError {
    fn from(err: String) -> CliError {
        CliError::Other(err)
    }
}
