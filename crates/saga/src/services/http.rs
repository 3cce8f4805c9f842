//! HTTP client for the inventory service.
//!
//! Wire contract:
//! - `GET  {base}/products/{id}` answers `{"Status","Message","Data":{"id","name","price","stock"}}`
//! - `PATCH {base}/products/{id}` takes `{"stock": n}` or, for a conditional
//!   write, `{"stock": n, "expected_stock": m}`. A failed condition answers
//!   `409` with the current product in `Data`.

use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use domain::Money;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::inventory::{InventoryError, InventoryGateway, ProductSnapshot};

#[derive(Debug, Deserialize)]
struct ProductEnvelope {
    #[serde(rename = "Data")]
    data: ProductBody,
}

#[derive(Debug, Deserialize)]
struct ProductBody {
    id: i64,
    price: f64,
    stock: i64,
}

#[derive(Debug, Serialize)]
struct StockUpdate {
    stock: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_stock: Option<i64>,
}

/// [`InventoryGateway`] backed by the inventory service's REST API.
#[derive(Debug, Clone)]
pub struct HttpInventoryGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpInventoryGateway {
    /// Builds a client for `base_url` whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, InventoryError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(InventoryError::Validation(
                "inventory base URL not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn product_url(&self, id: ProductId) -> String {
        format!("{}/products/{}", self.base_url, id)
    }

    fn transport_error(&self, err: reqwest::Error) -> InventoryError {
        if err.is_timeout() {
            InventoryError::Timeout(self.timeout)
        } else {
            InventoryError::Unavailable(err.to_string())
        }
    }

    async fn decode(
        &self,
        id: ProductId,
        response: reqwest::Response,
    ) -> Result<ProductSnapshot, InventoryError> {
        let envelope: ProductEnvelope = response
            .json()
            .await
            .map_err(|e| InventoryError::InvalidResponse(e.to_string()))?;

        if envelope.data.id != id.as_i64() {
            warn!(requested = %id, returned = envelope.data.id, "mismatched product id in inventory response");
        }

        Ok(ProductSnapshot {
            product_id: id,
            price: Money::from_decimal(envelope.data.price)
                .map_err(|e| InventoryError::InvalidResponse(e.to_string()))?,
            stock: envelope.data.stock,
        })
    }

    async fn patch_stock(
        &self,
        id: ProductId,
        update: StockUpdate,
    ) -> Result<(), InventoryError> {
        if update.stock < 0 {
            return Err(InventoryError::Validation(format!(
                "stock cannot be negative: {}",
                update.stock
            )));
        }

        let response = self
            .client
            .patch(self.product_url(id))
            .json(&update)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            status if status.is_success() => {
                debug!(product_id = %id, stock = update.stock, "inventory stock updated");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(InventoryError::NotFound(id)),
            StatusCode::CONFLICT => {
                let current = self.decode(id, response).await?;
                Err(InventoryError::Conflict {
                    product_id: id,
                    expected: update.expected_stock.unwrap_or(current.stock),
                    actual: current.stock,
                })
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(InventoryError::Validation(
                    body.chars().take(200).collect::<String>(),
                ))
            }
            status => Err(InventoryError::Unavailable(format!(
                "inventory returned HTTP {status} for product {id}"
            ))),
        }
    }
}

#[async_trait]
impl InventoryGateway for HttpInventoryGateway {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot, InventoryError> {
        let response = self
            .client
            .get(self.product_url(id))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::OK => self.decode(id, response).await,
            StatusCode::NOT_FOUND => Err(InventoryError::NotFound(id)),
            status => Err(InventoryError::Unavailable(format!(
                "inventory returned HTTP {status} for product {id}"
            ))),
        }
    }

    async fn set_stock(&self, id: ProductId, new_stock: i64) -> Result<(), InventoryError> {
        self.patch_stock(
            id,
            StockUpdate {
                stock: new_stock,
                expected_stock: None,
            },
        )
        .await
    }

    async fn compare_and_set_stock(
        &self,
        id: ProductId,
        expected: i64,
        new_stock: i64,
    ) -> Result<(), InventoryError> {
        self.patch_stock(
            id,
            StockUpdate {
                stock: new_stock,
                expected_stock: Some(expected),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_base_url() {
        assert!(HttpInventoryGateway::new("", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let gateway = HttpInventoryGateway::new("http://inventory:8081/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            gateway.product_url(ProductId::new(3).unwrap()),
            "http://inventory:8081/products/3"
        );
    }

    #[test]
    fn conditional_update_body() {
        let json = serde_json::to_value(StockUpdate {
            stock: 2,
            expected_stock: Some(5),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"stock": 2, "expected_stock": 5}));

        let json = serde_json::to_value(StockUpdate {
            stock: 2,
            expected_stock: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"stock": 2}));
    }

    #[tokio::test]
    async fn negative_stock_is_rejected_before_sending() {
        // Nothing listens here; reaching the network would surface Unavailable.
        let gateway =
            HttpInventoryGateway::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = gateway
            .set_stock(ProductId::new(1).unwrap(), -3)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }
}
