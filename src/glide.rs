use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::GlideConfig;
use crate::web::metrics::Metrics;

pub mod types;

pub use self::types::{Mutation, MutationResult, QueryPage, TableRow};

const INITIAL_RETRY_SECONDS: u64 = 1;
const MAX_RETRY_SECONDS: u64 = 60;
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, thiserror::Error)]
pub enum GlideError {
    #[error("rate limited by Glide API, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
    #[error("Glide API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid Glide API response: {0}")]
    InvalidResponse(String),
}

impl GlideError {
    /// Transient failures worth another attempt: rate limits, transport
    /// errors, and server-side 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            GlideError::RateLimited { .. } | GlideError::Network(_) => true,
            GlideError::Api { status, .. } => (500..=599).contains(status),
            GlideError::InvalidResponse(_) => false,
        }
    }
}

/// The two Glide API calls the sync engine needs. Split into a trait so
/// engine tests can script responses without a network.
#[async_trait]
pub trait GlideApi: Send + Sync {
    /// Fetches one page of rows, continuing from `start_at` when given.
    async fn query_table_page(
        &self,
        table: &str,
        start_at: Option<&str>,
    ) -> Result<QueryPage, GlideError>;

    /// Applies a batch of mutations; results align with the input order.
    async fn mutate_batch(
        &self,
        mutations: &[Mutation],
    ) -> Result<Vec<MutationResult>, GlideError>;
}

pub struct GlideClient {
    http: reqwest::Client,
    endpoint: String,
    app_id: String,
    api_key: SecretString,
    max_retries: u32,
}

impl GlideClient {
    pub fn new(config: &GlideConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("glide-sync")
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to construct HTTP client")?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            api_key: SecretString::from(config.api_key.clone()),
            max_retries: config.max_retries,
        })
    }

    async fn post_function(&self, function: &str, payload: &Value) -> Result<Value, GlideError> {
        let url = format!("{}/function/{}", self.endpoint, function);
        let mut retry_seconds = INITIAL_RETRY_SECONDS;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.try_post(&url, payload).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt <= self.max_retries => {
                    Metrics::api_retry();
                    let wait = match &err {
                        GlideError::RateLimited {
                            retry_after_seconds,
                        } => (*retry_after_seconds).max(retry_seconds),
                        _ => retry_seconds,
                    };
                    warn!(
                        "glide {function} request failed (attempt {attempt}): {err}. \
                         retrying in {wait} seconds"
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    retry_seconds = (retry_seconds * 2).min(MAX_RETRY_SECONDS);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_post(&self, url: &str, payload: &Value) -> Result<Value, GlideError> {
        Metrics::api_request();
        let response = self
            .http
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| GlideError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_seconds = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(INITIAL_RETRY_SECONDS);
            return Err(GlideError::RateLimited {
                retry_after_seconds,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GlideError::Api {
                status: status.as_u16(),
                message: truncate_error_body(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| GlideError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl GlideApi for GlideClient {
    async fn query_table_page(
        &self,
        table: &str,
        start_at: Option<&str>,
    ) -> Result<QueryPage, GlideError> {
        let mut query = serde_json::Map::new();
        query.insert("tableName".to_string(), Value::String(table.to_string()));
        if let Some(token) = start_at {
            query.insert("startAt".to_string(), Value::String(token.to_string()));
        }
        let payload = json!({
            "appID": self.app_id,
            "queries": [Value::Object(query)],
        });

        let body = self.post_function("queryTables", &payload).await?;
        let page = QueryPage::from_response(&body).ok_or_else(|| {
            GlideError::InvalidResponse("queryTables body has no rows array".to_string())
        })?;
        debug!(
            "glide queryTables {table}: {} rows, continuation {}",
            page.rows.len(),
            page.next.is_some()
        );
        Ok(page)
    }

    async fn mutate_batch(
        &self,
        mutations: &[Mutation],
    ) -> Result<Vec<MutationResult>, GlideError> {
        if mutations.is_empty() {
            return Ok(Vec::new());
        }

        let payload = json!({
            "appID": self.app_id,
            "mutations": mutations,
        });

        let body = self.post_function("mutateTables", &payload).await?;
        let results = body
            .as_array()
            .ok_or_else(|| {
                GlideError::InvalidResponse("mutateTables body is not an array".to_string())
            })?
            .iter()
            .map(MutationResult::from_response)
            .collect();
        Ok(results)
    }
}

/// Error bodies can be HTML pages; keep logs and stored messages short.
fn truncate_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        assert!(
            GlideError::RateLimited {
                retry_after_seconds: 5
            }
            .is_retryable()
        );
        assert!(GlideError::Network("connection reset".to_string()).is_retryable());
        assert!(
            GlideError::Api {
                status: 503,
                message: "unavailable".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(
            !GlideError::Api {
                status: 401,
                message: "bad key".to_string()
            }
            .is_retryable()
        );
        assert!(!GlideError::InvalidResponse("not json".to_string()).is_retryable());
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let truncated = truncate_error_body(&body);
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS + 3);
        assert!(truncated.ends_with("..."));

        assert_eq!(truncate_error_body("  short  "), "short");
    }
}
