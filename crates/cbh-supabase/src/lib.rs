//! Supabase (PostgREST) adapter for the quota ledger and language preferences.
//!
//! Expects the tables and the `try_consume_quota` function from
//! `sql/schema.sql`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use cbh_core::{
    config::SupabaseCredentials,
    domain::{Language, UserId},
    errors::{Error, QuotaStoreError},
    ports::{PreferenceStore, QuotaOutcome, QuotaStore},
    utils::truncate_text,
    Result,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin PostgREST client shared by both stores.
#[derive(Clone, Debug)]
pub struct SupabaseClient {
    rest_url: String,
    key: String,
    http: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(creds: &SupabaseCredentials) -> Result<Self> {
        Self::with_timeout(creds, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(creds: &SupabaseCredentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("reqwest client build: {e}")))?;
        Ok(Self {
            rest_url: format!("{}/rest/v1", creds.url.trim_end_matches('/')),
            key: creds.key.clone(),
            http,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.rest_url, path))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> std::result::Result<T, QuotaStoreError> {
        let resp = send(req).await?;
        resp.json::<T>()
            .await
            .map_err(|e| QuotaStoreError::Backend(format!("supabase json error: {e}")))
    }
}

async fn send(
    req: reqwest::RequestBuilder,
) -> std::result::Result<reqwest::Response, QuotaStoreError> {
    let resp = req.send().await.map_err(|e| {
        if e.is_timeout() {
            QuotaStoreError::Unavailable("request timed out".to_string())
        } else {
            QuotaStoreError::Unavailable(e.to_string())
        }
    })?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        debug!(
            status = status.as_u16(),
            body = %truncate_text(&body, 200),
            "supabase error response"
        );
        return Err(QuotaStoreError::Backend(format!(
            "supabase returned status {}",
            status.as_u16()
        )));
    }
    Ok(resp)
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

// ============== Quota ==============

#[derive(Debug, Serialize)]
struct ConsumeArgs {
    p_user_id: i64,
    p_date: NaiveDate,
    p_limit: u32,
}

#[derive(Debug, Deserialize)]
struct ConsumeReply {
    allowed: bool,
    count: u32,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u32,
}

/// Quota store over `usage_logs`; increments happen inside Postgres.
#[derive(Clone, Debug)]
pub struct SupabaseQuotaStore {
    client: SupabaseClient,
}

impl SupabaseQuotaStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuotaStore for SupabaseQuotaStore {
    async fn try_consume(
        &self,
        user_id: UserId,
        date: NaiveDate,
        limit: u32,
    ) -> std::result::Result<QuotaOutcome, QuotaStoreError> {
        // Nothing can be granted; don't let the upsert create a row.
        if limit == 0 {
            return Ok(QuotaOutcome::Denied(self.peek(user_id, date).await?));
        }
        let req = self
            .client
            .request(reqwest::Method::POST, "rpc/try_consume_quota")
            .json(&ConsumeArgs {
                p_user_id: user_id.0,
                p_date: date,
                p_limit: limit,
            });
        let reply: ConsumeReply = self.client.send_json(req).await?;
        Ok(if reply.allowed {
            QuotaOutcome::Allowed(reply.count)
        } else {
            QuotaOutcome::Denied(reply.count)
        })
    }

    async fn peek(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> std::result::Result<u32, QuotaStoreError> {
        let req = self
            .client
            .request(reqwest::Method::GET, "usage_logs")
            .query(&[
                ("select", "count".to_string()),
                ("user_id", eq(user_id)),
                ("date", eq(date)),
            ]);
        let rows: Vec<CountRow> = self.client.send_json(req).await?;
        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }
}

// ============== Preferences ==============

#[derive(Debug, Serialize, Deserialize)]
struct PreferenceRow {
    #[serde(default, skip_deserializing)]
    user_id: i64,
    language: String,
}

/// Language preferences in `user_preferences`, upserted on `user_id`.
#[derive(Clone, Debug)]
pub struct SupabasePreferenceStore {
    client: SupabaseClient,
}

impl SupabasePreferenceStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PreferenceStore for SupabasePreferenceStore {
    async fn load(
        &self,
        user_id: UserId,
    ) -> std::result::Result<Option<Language>, QuotaStoreError> {
        let req = self
            .client
            .request(reqwest::Method::GET, "user_preferences")
            .query(&[("select", "language".to_string()), ("user_id", eq(user_id))]);
        let rows: Vec<PreferenceRow> = self.client.send_json(req).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let parsed = Language::from_code(&row.language);
        if parsed.is_none() {
            warn!(user = %user_id, value = %row.language, "ignoring unknown stored language");
        }
        Ok(parsed)
    }

    async fn save(
        &self,
        user_id: UserId,
        language: Language,
    ) -> std::result::Result<(), QuotaStoreError> {
        let req = self
            .client
            .request(reqwest::Method::POST, "user_preferences")
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[PreferenceRow {
                user_id: user_id.0,
                language: language.code().to_string(),
            }]);
        send(req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn client(server: &MockServer) -> SupabaseClient {
        SupabaseClient::with_timeout(
            &SupabaseCredentials {
                url: server.base_url(),
                key: "service-key".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    #[tokio::test]
    async fn try_consume_calls_rpc_with_typed_args() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rest/v1/rpc/try_consume_quota")
                    .header("apikey", "service-key")
                    .header("authorization", "Bearer service-key")
                    .json_body(serde_json::json!({
                        "p_user_id": 42,
                        "p_date": "2024-05-17",
                        "p_limit": 3
                    }));
                then.status(200).body(r#"{"allowed":true,"count":2}"#);
            })
            .await;

        let store = SupabaseQuotaStore::new(client(&server));
        assert_eq!(
            store.try_consume(UserId(42), day(), 3).await,
            Ok(QuotaOutcome::Allowed(2))
        );
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn try_consume_denied_keeps_count() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rest/v1/rpc/try_consume_quota");
                then.status(200).body(r#"{"allowed":false,"count":3}"#);
            })
            .await;

        let store = SupabaseQuotaStore::new(client(&server));
        assert_eq!(
            store.try_consume(UserId(42), day(), 3).await,
            Ok(QuotaOutcome::Denied(3))
        );
    }

    #[tokio::test]
    async fn zero_limit_is_denied_without_rpc() {
        let server = MockServer::start_async().await;
        let rpc = server
            .mock_async(|when, then| {
                when.method(POST).path("/rest/v1/rpc/try_consume_quota");
                then.status(200).body(r#"{"allowed":true,"count":1}"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/usage_logs");
                then.status(200).body("[]");
            })
            .await;

        let store = SupabaseQuotaStore::new(client(&server));
        assert_eq!(
            store.try_consume(UserId(42), day(), 0).await,
            Ok(QuotaOutcome::Denied(0))
        );
        rpc.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn server_error_is_backend_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rest/v1/rpc/try_consume_quota");
                then.status(500).body(r#"{"message":"boom"}"#);
            })
            .await;

        let store = SupabaseQuotaStore::new(client(&server));
        assert!(matches!(
            store.try_consume(UserId(1), day(), 3).await,
            Err(QuotaStoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn peek_filters_by_user_and_date() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/usage_logs")
                    .query_param("select", "count")
                    .query_param("user_id", "eq.42")
                    .query_param("date", "eq.2024-05-17");
                then.status(200).body(r#"[{"count":2}]"#);
            })
            .await;

        let store = SupabaseQuotaStore::new(client(&server));
        assert_eq!(store.peek(UserId(42), day()).await, Ok(2));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn peek_without_row_is_zero() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/usage_logs");
                then.status(200).body("[]");
            })
            .await;

        let store = SupabaseQuotaStore::new(client(&server));
        assert_eq!(store.peek(UserId(7), day()).await, Ok(0));
    }

    #[tokio::test]
    async fn preference_round_trip_shapes() {
        let server = MockServer::start_async().await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rest/v1/user_preferences")
                    .query_param("on_conflict", "user_id")
                    .header("prefer", "resolution=merge-duplicates,return=minimal")
                    .json_body(serde_json::json!([{ "user_id": 42, "language": "cn" }]));
                then.status(201);
            })
            .await;
        let select = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/user_preferences")
                    .query_param("user_id", "eq.42");
                then.status(200).body(r#"[{"language":"cn"}]"#);
            })
            .await;

        let store = SupabasePreferenceStore::new(client(&server));
        store.save(UserId(42), Language::Chinese).await.unwrap();
        assert_eq!(store.load(UserId(42)).await, Ok(Some(Language::Chinese)));
        upsert.assert_hits_async(1).await;
        select.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn unknown_stored_language_is_ignored() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/user_preferences");
                then.status(200).body(r#"[{"language":"klingon"}]"#);
            })
            .await;

        let store = SupabasePreferenceStore::new(client(&server));
        assert_eq!(store.load(UserId(42)).await, Ok(None));
    }
}
