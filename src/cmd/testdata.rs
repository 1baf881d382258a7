static USAGE: &str = r#"
Generate a CSV file of random price rows for development and load tests.

Each row has the wire form the watcher ingests: a UUID id, a random
decimal price and an expiration timestamp within the next few days, e.g.

    0c6e4f2e-...-9d1c,555.1333332,2024-05-04 10:30:00 +0000 UTC

The file is written into <outdir> under a timestamped name. Point
<outdir> at the watched directory to feed a running `prices watch`.

Usage:
    prices testdata <rows> <outdir>
    prices testdata --help

Common options:
    -h, --help             Display this message
"#;

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{Duration, Utc};
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

use crate::{CliResult, util};

#[derive(Deserialize)]
struct Args {
    arg_rows:   usize,
    arg_outdir: String,
}

pub fn run(argv: &[&str]) -> CliResult<()> {
    let args: Args = util::get_args(USAGE, argv)?;
    if args.arg_rows == 0 {
        return fail_incorrectusage_clierror!("<rows> must be greater than 0.");
    }

    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let path = Path::new(&args.arg_outdir).join(format!("{now_ns}_test_prices.csv"));

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)?;
    let mut rng = rand::rng();
    for _ in 0..args.arg_rows {
        let price = format!(
            "{}.{}",
            rng.random_range(0..20) * 111,
            rng.random_range(0..20) * 111_111
        );
        let expiration_date = Utc::now() + Duration::days(rng.random_range(0..5));
        wtr.write_record([
            Uuid::new_v4().to_string(),
            price,
            format!("{} UTC", expiration_date.format("%Y-%m-%d %H:%M:%S %z")),
        ])?;
    }
    wtr.flush()?;

    eprintln!("Wrote {} rows to '{}'.", args.arg_rows, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models;

    #[test]
    fn generated_rows_are_ingestible() {
        let dir = TempDir::new().unwrap();
        run(&[
            "prices",
            "testdata",
            "25",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().to_string_lossy().into_owned();
        assert!(name.ends_with("_test_prices.csv"));

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(entries[0].path())
            .unwrap();
        let mut rows = 0;
        for record in rdr.records() {
            let record = record.unwrap();
            assert_eq!(record.len(), 3);
            models::parse_price(&record[1]).unwrap();
            models::parse_expiration_date(&record[2]).unwrap();
            rows += 1;
        }
        assert_eq!(rows, 25);
    }

    #[test]
    fn zero_rows_is_a_usage_error() {
        let dir = TempDir::new().unwrap();
        let err = run(&[
            "prices",
            "testdata",
            "0",
            dir.path().to_str().unwrap(),
        ])
        .unwrap_err();
        assert!(matches!(err, crate::CliError::IncorrectUsage(_)));
    }
}
