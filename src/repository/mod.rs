//! Persistence for price records.
//!
//! The pipeline and the API only see the [`Prices`] trait; the MySQL
//! implementation behind it is selected from the storage config.

pub mod mysql;

use std::{path::Path, sync::Arc};

use crate::{config, models::Price};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("price not found")]
    NotFound,
    #[error("storage error: {0}")]
    Sql(#[from] ::mysql::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("bad stored row for id={0}")]
    BadRow(String),
    #[error("can't create storage, unknown driver={0}")]
    UnknownDriver(String),
}

pub trait Prices: Send + Sync {
    /// Batch insert keyed on id; rows whose id already exists are ignored.
    fn create_many(&self, prices: &[Price]) -> Result<(), RepositoryError>;

    /// Bulk load a whole CSV file; duplicate-key rows are ignored.
    fn import_file(&self, path: &Path) -> Result<(), RepositoryError>;

    fn get(&self, id: &str) -> Result<Price, RepositoryError>;
}

pub fn new_prices(config: &config::Storage) -> Result<Arc<dyn Prices>, RepositoryError> {
    match config.driver.as_str() {
        "mysql" => Ok(Arc::new(mysql::MysqlPrices::new(config)?)),
        other => Err(RepositoryError::UnknownDriver(other.to_owned())),
    }
}
