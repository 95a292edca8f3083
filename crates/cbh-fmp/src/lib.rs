//! Financial Modeling Prep adapter (real-time quotes).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use cbh_core::{
    config::Config,
    domain::QuoteSnapshot,
    errors::{AdapterError, Error},
    ports::QuoteSource,
    Result,
};

#[derive(Clone, Debug)]
pub struct FmpClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

/// One element of the `/api/v3/quote/{symbol}` array.
#[derive(Debug, Deserialize)]
struct FmpQuote {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    change: Option<f64>,
    #[serde(default, rename = "changesPercentage")]
    changes_percentage: Option<f64>,
}

impl FmpClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("reqwest client build: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let Some(key) = cfg.fmp_api_key.as_deref() else {
            return Ok(None);
        };
        Self::new(key, &cfg.fmp_base_url, cfg.quote_timeout).map(Some)
    }
}

#[async_trait]
impl QuoteSource for FmpClient {
    async fn fetch(&self, symbol: &str) -> std::result::Result<QuoteSnapshot, AdapterError> {
        if self.api_key.trim().is_empty() {
            return Err(AdapterError::ServiceMisconfigured);
        }

        let url = format!("{}/api/v3/quote/{}", self.base_url, symbol);
        debug!(symbol, "fetching quote");

        let resp = self
            .http
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| AdapterError::from_transport(e.is_timeout(), e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AdapterError::UpstreamStatus(status.as_u16()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AdapterError::from_transport(e.is_timeout(), e))?;
        let quotes: Vec<FmpQuote> = serde_json::from_str(&body).map_err(|e| {
            AdapterError::InvalidResponse(format!("fmp json error: {e}"))
        })?;

        let Some(first) = quotes.into_iter().next() else {
            return Err(AdapterError::NoData);
        };
        let Some(price) = first.price else {
            return Err(AdapterError::NoData);
        };

        let symbol = first.symbol.unwrap_or_else(|| symbol.to_string());
        Ok(QuoteSnapshot {
            name: first.name.unwrap_or_else(|| symbol.clone()),
            symbol,
            price,
            change: first.change.unwrap_or(0.0),
            change_percent: first.changes_percentage.unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};

    fn client(server: &MockServer, timeout: Duration) -> FmpClient {
        FmpClient::new("demo-key", server.base_url(), timeout).unwrap()
    }

    #[tokio::test]
    async fn parses_first_quote() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v3/quote/XAUUSD")
                    .query_param("apikey", "demo-key");
                then.status(200).header("content-type", "application/json").body(
                    r#"[{"symbol":"XAUUSD","name":"Gold","price":2350.1,"change":-3.2,"changesPercentage":-0.136,"volume":0}]"#,
                );
            })
            .await;

        let q = client(&server, Duration::from_secs(5))
            .fetch("XAUUSD")
            .await
            .unwrap();

        assert_eq!(
            q,
            QuoteSnapshot {
                symbol: "XAUUSD".into(),
                name: "Gold".into(),
                price: 2350.1,
                change: -3.2,
                change_percent: -0.136,
            }
        );
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn missing_optional_fields_get_defaults() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v3/quote/BTCUSD");
                then.status(200).body(r#"[{"price":64000}]"#);
            })
            .await;

        let q = client(&server, Duration::from_secs(5))
            .fetch("BTCUSD")
            .await
            .unwrap();
        assert_eq!(q.symbol, "BTCUSD");
        assert_eq!(q.name, "BTCUSD");
        assert_eq!(q.change, 0.0);
        assert_eq!(q.change_percent, 0.0);
    }

    #[tokio::test]
    async fn empty_array_is_no_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v3/quote/NOPE");
                then.status(200).body("[]");
            })
            .await;

        assert_eq!(
            client(&server, Duration::from_secs(5)).fetch("NOPE").await,
            Err(AdapterError::NoData)
        );
    }

    #[tokio::test]
    async fn missing_price_is_no_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v3/quote/XAUUSD");
                then.status(200).body(r#"[{"symbol":"XAUUSD","price":null}]"#);
            })
            .await;

        assert_eq!(
            client(&server, Duration::from_secs(5)).fetch("XAUUSD").await,
            Err(AdapterError::NoData)
        );
    }

    #[tokio::test]
    async fn error_object_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v3/quote/XAUUSD");
                then.status(200)
                    .body(r#"{"Error Message":"Invalid API KEY."}"#);
            })
            .await;

        assert!(matches!(
            client(&server, Duration::from_secs(5)).fetch("XAUUSD").await,
            Err(AdapterError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn http_error_is_upstream_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v3/quote/XAUUSD");
                then.status(403);
            })
            .await;

        assert_eq!(
            client(&server, Duration::from_secs(5)).fetch("XAUUSD").await,
            Err(AdapterError::UpstreamStatus(403))
        );
    }

    #[tokio::test]
    async fn slow_upstream_is_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v3/quote/XAUUSD");
                then.status(200)
                    .delay(Duration::from_millis(1500))
                    .body(r#"[{"price":1}]"#);
            })
            .await;

        assert_eq!(
            client(&server, Duration::from_millis(200))
                .fetch("XAUUSD")
                .await,
            Err(AdapterError::Timeout)
        );
    }
}
