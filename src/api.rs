//! Read-only price lookup API served by the `serve` command.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, FixedOffset};
use log::error;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::repository::{Prices, RepositoryError};

pub const BASE_URL: &str = "/api/v0/prices";

#[derive(Clone)]
struct ApiState {
    repo: Arc<dyn Prices>,
}

#[derive(Debug, Serialize)]
struct PriceResponse {
    id:              String,
    /// Exact decimal everywhere else; a binary float only here, at the
    /// wire boundary.
    price:           f64,
    expiration_date: DateTime<FixedOffset>,
}

pub fn router(repo: Arc<dyn Prices>) -> Router {
    Router::new()
        .route(&format!("{BASE_URL}/{{id}}"), get(get_price))
        .with_state(ApiState { repo })
}

async fn get_price(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<PriceResponse>, StatusCode> {
    let repo = state.repo.clone();
    let lookup_id = id.clone();
    // the repository client is blocking; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || repo.get(&lookup_id))
        .await
        .map_err(|err| {
            error!("price lookup task failed: ({err})");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match result {
        Ok(price) => Ok(Json(PriceResponse {
            id:              price.id,
            price:           price.price.to_f64().unwrap_or_default(),
            expiration_date: price.expiration_date,
        })),
        Err(RepositoryError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            error!("can't get price, id={id}: ({err})");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{io, path::Path as FsPath};

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::models::{Price, parse_expiration_date, parse_price};

    struct StubRepo {
        price: Option<Price>,
        fail:  bool,
    }

    impl Prices for StubRepo {
        fn create_many(&self, _prices: &[Price]) -> Result<(), RepositoryError> {
            Ok(())
        }

        fn import_file(&self, _path: &FsPath) -> Result<(), RepositoryError> {
            Ok(())
        }

        fn get(&self, _id: &str) -> Result<Price, RepositoryError> {
            if self.fail {
                return Err(RepositoryError::Io(io::Error::other("storage down")));
            }
            self.price.clone().ok_or(RepositoryError::NotFound)
        }
    }

    fn sample_price() -> Price {
        Price {
            id:              String::from("promo-1"),
            price:           parse_price("19.99").unwrap(),
            expiration_date: parse_expiration_date("2024-05-01 10:30:00 +0000 UTC").unwrap(),
        }
    }

    async fn request(repo: StubRepo, uri: &str) -> (StatusCode, Vec<u8>) {
        let app = router(Arc::new(repo));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn known_id_returns_the_price() {
        let repo = StubRepo {
            price: Some(sample_price()),
            fail:  false,
        };
        let (status, body) = request(repo, "/api/v0/prices/promo-1").await;
        assert_eq!(status, StatusCode::OK);

        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["id"], "promo-1");
        assert_eq!(value["price"], 19.99);
        assert!(value["expiration_date"].as_str().unwrap().starts_with("2024-05-01"));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let repo = StubRepo {
            price: None,
            fail:  false,
        };
        let (status, _body) = request(repo, "/api/v0/prices/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn storage_failure_is_internal_error() {
        let repo = StubRepo {
            price: Some(sample_price()),
            fail:  true,
        };
        let (status, _body) = request(repo, "/api/v0/prices/promo-1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
