use docopt::Docopt;
use serde::de::DeserializeOwned;

use crate::CliResult;

pub fn version() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

pub fn get_args<T>(usage: &str, argv: &[&str]) -> CliResult<T>
where
    T: DeserializeOwned,
{
    Docopt::new(usage)
        .and_then(|d| {
            d.argv(argv.iter().copied())
                .version(Some(version()))
                .deserialize()
        })
        .map_err(From::from)
}

/// Number of jobs to use for a worker pool, defaulting to the detected
/// CPU count when the configured value is zero.
pub fn njobs(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::njobs;

    #[test]
    fn njobs_zero_falls_back_to_cpu_count() {
        assert!(njobs(0) >= 1);
    }

    #[test]
    fn njobs_passthrough() {
        assert_eq!(njobs(3), 3);
    }
}
