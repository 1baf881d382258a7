//! MySQL-backed [`Prices`] repository.
//!
//! The schema is applied idempotently at construction; no external
//! migration step runs before the pipeline or the API starts.
//! `import_file` issues `LOAD DATA LOCAL INFILE` with a client-side
//! handler that streams the file to the server.

use std::{fs, io::Write, path::Path, str::FromStr};

use chrono::{NaiveDateTime, TimeZone, Utc};
use mysql::{LocalInfileHandler, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Value, prelude::Queryable};
use rust_decimal::Decimal;

use super::{Prices, RepositoryError};
use crate::{config, models::Price};

const INIT_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS prices (
        id              VARCHAR(64)    NOT NULL,
        price           DECIMAL(20, 4) NOT NULL,
        expiration_date DATETIME       NOT NULL,
        PRIMARY KEY (id)
    )
"#;

const SELECT_SQL: &str = r#"
    SELECT id, CAST(price AS CHAR), DATE_FORMAT(expiration_date, '%Y-%m-%d %H:%i:%s')
    FROM prices
    WHERE id = ?
"#;

/// DATETIME has no zone; timestamps are normalized to UTC on write and
/// reported as UTC on read.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct MysqlPrices {
    pool: Pool,
}

impl MysqlPrices {
    pub fn new(config: &config::Storage) -> Result<MysqlPrices, RepositoryError> {
        let opts = Opts::from_url(&config.dsn).map_err(mysql::Error::from)?;
        let constraints = PoolConstraints::new(1, config.max_connections.max(1))
            .unwrap_or_else(|| PoolConstraints::new(1, 1).unwrap());
        let pool_opts = PoolOpts::default().with_constraints(constraints);
        let pool = Pool::new(OptsBuilder::from_opts(opts).pool_opts(pool_opts))?;
        let mut conn = pool.get_conn()?;
        conn.query_drop(INIT_SQL)?;
        Ok(MysqlPrices { pool })
    }
}

impl Prices for MysqlPrices {
    fn create_many(&self, prices: &[Price]) -> Result<(), RepositoryError> {
        if prices.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get_conn()?;
        let mut params: Vec<Value> = Vec::with_capacity(prices.len() * 3);
        for price in prices {
            params.push(Value::from(price.id.as_str()));
            params.push(Value::from(price.price.to_string()));
            params.push(Value::from(
                price
                    .expiration_date
                    .with_timezone(&Utc)
                    .format(DATETIME_FORMAT)
                    .to_string(),
            ));
        }
        conn.exec_drop(insert_sql(prices.len()), params)?;
        Ok(())
    }

    fn import_file(&self, path: &Path) -> Result<(), RepositoryError> {
        let mut conn = self.pool.get_conn()?;
        conn.set_local_infile_handler(Some(LocalInfileHandler::new(|file_name, writer| {
            let name = String::from_utf8_lossy(file_name).into_owned();
            let bytes = fs::read(&name)?;
            writer.write_all(&bytes)
        })));
        conn.query_drop(import_sql(path))?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Price, RepositoryError> {
        let mut conn = self.pool.get_conn()?;
        let row: Option<(String, String, String)> = conn.exec_first(SELECT_SQL, (id,))?;
        let (id, raw_price, raw_date) = row.ok_or(RepositoryError::NotFound)?;
        let price =
            Decimal::from_str(&raw_price).map_err(|_| RepositoryError::BadRow(id.clone()))?;
        let naive = NaiveDateTime::parse_from_str(&raw_date, DATETIME_FORMAT)
            .map_err(|_| RepositoryError::BadRow(id.clone()))?;
        Ok(Price {
            id,
            price,
            expiration_date: Utc.from_utc_datetime(&naive).fixed_offset(),
        })
    }
}

fn insert_sql(rows: usize) -> String {
    let mut sql =
        String::from("INSERT IGNORE INTO prices (id, price, expiration_date) VALUES ");
    for i in 0..rows {
        if i > 0 {
            sql.push(',');
        }
        sql.push_str("(?, ?, ?)");
    }
    sql
}

fn import_sql(path: &Path) -> String {
    // the path is interpolated into the statement, so quote metacharacters
    let quoted = path
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('\'', "''");
    format!(
        "LOAD DATA LOCAL INFILE '{quoted}' IGNORE INTO TABLE prices \
         FIELDS TERMINATED BY ',' LINES TERMINATED BY '\n' \
         (id, price, expiration_date)"
    )
}
