use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Fulfilment state reported by the commerce platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Refunded,
}

/// One purchase from a customer's order history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub order_id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    /// Completed and containing `product_id`
    pub fn proves_purchase_of(&self, product_id: &str) -> bool {
        self.status == OrderStatus::Completed && self.product_ids.iter().any(|p| p == product_id)
    }
}

/// External source of purchase records
#[async_trait]
pub trait OrderHistoryProvider: Send + Sync {
    /// All orders placed by `user_id`, in any status
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<PurchaseOrder>>;
}

/// Fixed order list, loaded from a file or built in memory
#[derive(Debug, Clone, Default)]
pub struct StaticOrderHistory {
    orders: Vec<PurchaseOrder>,
}

impl StaticOrderHistory {
    pub fn new(orders: Vec<PurchaseOrder>) -> Self {
        Self { orders }
    }

    /// Load a YAML (or JSON) list of orders; a missing file means no orders
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Order history file not found, no purchases known");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read order history: {}", path.display()))?;
        let orders: Vec<PurchaseOrder> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse order history: {}", path.display()))?;

        info!(path = %path.display(), count = orders.len(), "Loaded order history");

        Ok(Self { orders })
    }
}

#[async_trait]
impl OrderHistoryProvider for StaticOrderHistory {
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<PurchaseOrder>> {
        Ok(self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Commerce platform order API client
pub struct HttpOrderHistory {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    orders: Vec<PurchaseOrder>,
}

impl HttpOrderHistory {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build order history HTTP client")?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid order history base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Order history base URL cannot take a path: {}", base_url);
        }

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// `{base}/customers/{user_id}/orders` with `user_id` as one encoded segment
    fn orders_url(&self, user_id: &str) -> Result<Url> {
        if user_id.is_empty() || user_id == "." || user_id == ".." {
            anyhow::bail!("Invalid customer id for order lookup: {:?}", user_id);
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Order history base URL cannot take a path"))?
            .pop_if_empty()
            .extend(["customers", user_id, "orders"]);
        Ok(url)
    }
}

#[async_trait]
impl OrderHistoryProvider for HttpOrderHistory {
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<PurchaseOrder>> {
        let url = self.orders_url(user_id)?;
        debug!(%url, "Fetching order history");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach order history API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Order history API error ({}): {}", status, body);
        }

        let parsed: OrdersResponse = response
            .json()
            .await
            .context("Failed to parse order history response")?;

        Ok(parsed.orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order(id: &str, status: OrderStatus, products: &[&str]) -> PurchaseOrder {
        PurchaseOrder {
            order_id: id.to_string(),
            user_id: "u1".to_string(),
            status,
            product_ids: products.iter().map(|p| p.to_string()).collect(),
            completed_at: None,
        }
    }

    #[test]
    fn test_only_completed_orders_prove_purchase() {
        assert!(order("o1", OrderStatus::Completed, &["p1"]).proves_purchase_of("p1"));
        assert!(!order("o1", OrderStatus::Completed, &["p2"]).proves_purchase_of("p1"));
        assert!(!order("o1", OrderStatus::Refunded, &["p1"]).proves_purchase_of("p1"));
        assert!(!order("o1", OrderStatus::Processing, &["p1"]).proves_purchase_of("p1"));
    }

    #[tokio::test]
    async fn test_static_history_filters_by_user() {
        let mut other = order("o2", OrderStatus::Completed, &["p1"]);
        other.user_id = "u2".to_string();
        let history =
            StaticOrderHistory::new(vec![order("o1", OrderStatus::Completed, &["p1"]), other]);

        let orders = history.orders_for_user("u1").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "o1");
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("orders.yml");
        fs::write(
            &file,
            r#"
- order_id: "1001"
  user_id: u1
  status: completed
  product_ids: [p1, p2]
  completed_at: 2026-09-01T12:00:00Z
- order_id: "1002"
  user_id: u1
  status: cancelled
  product_ids: [p1]
"#,
        )
        .unwrap();

        let history = StaticOrderHistory::load(&file).unwrap();
        assert_eq!(history.orders.len(), 2);
        assert!(history.orders[0].completed_at.is_some());
        assert_eq!(history.orders[1].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_http_history_fetches_orders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/u1/orders"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "orders": [{
                    "order_id": "1001",
                    "user_id": "u1",
                    "status": "completed",
                    "product_ids": ["p1"]
                }]
            })))
            .mount(&server)
            .await;

        let history =
            HttpOrderHistory::new(server.uri(), Some("tok".to_string()), Duration::from_secs(5))
                .unwrap();
        let orders = history.orders_for_user("u1").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert!(orders[0].proves_purchase_of("p1"));
    }

    #[tokio::test]
    async fn test_http_history_surfaces_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let history = HttpOrderHistory::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        assert!(history.orders_for_user("u1").await.is_err());
    }

    #[tokio::test]
    async fn test_http_history_encodes_customer_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/customers/gid:%2F%2Fshop%2FCustomer%2F7/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "orders": [{
                    "order_id": "1001",
                    "user_id": "gid://shop/Customer/7",
                    "status": "completed",
                    "product_ids": ["p1"]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/api/", server.uri());
        let history = HttpOrderHistory::new(base, None, Duration::from_secs(5)).unwrap();
        let orders = history.orders_for_user("gid://shop/Customer/7").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "1001");
    }

    #[test]
    fn test_customer_id_cannot_escape_its_segment() {
        let history =
            HttpOrderHistory::new("https://shop.example.com/v1", None, Duration::from_secs(5))
                .unwrap();

        let url = history.orders_url("../admin?all=1").unwrap();
        assert_eq!(url.path(), "/v1/customers/..%2Fadmin%3Fall=1/orders");
        assert!(url.query().is_none());

        assert!(history.orders_url("..").is_err());
        assert!(history.orders_url("").is_err());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(HttpOrderHistory::new("not a url", None, Duration::from_secs(5)).is_err());
        assert!(HttpOrderHistory::new("mailto:orders@example.com", None, Duration::from_secs(5)).is_err());
    }
}
