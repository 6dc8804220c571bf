use crate::error::StoreError;
use futures::{
    future::BoxFuture,
    FutureExt as _,
};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// The two store calls the dumper needs.
pub trait SeriesStore: Send + Sync {
    /// Run one administrative statement.
    fn query<'a>(&'a self, statement: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Write a line protocol body with second precision.
    fn write<'a>(&'a self, database: &'a str, policy: &'a str, body: String) -> BoxFuture<'a, Result<(), StoreError>>;
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<StatementResult>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResult {
    #[serde(default)]
    error: Option<String>,
}

impl QueryResponse {
    fn first_error(self) -> Option<String> {
        self.error
            .or_else(|| self.results.into_iter().find_map(|result| result.error))
    }
}

/// InfluxDB 1.x HTTP API client.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    base: Url,
    http_client: HttpClient,
}

impl InfluxClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(&format!("http://{host}:{port}/"))?;
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self { base, http_client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn run_query(&self, statement: &str) -> Result<(), StoreError> {
        let response = self
            .http_client
            .post(self.base.join("query")?)
            .form(&[("q", statement)])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        // Statement errors come back as JSON, also on 4xx.
        if let Some(message) = serde_json::from_str::<QueryResponse>(&body)
            .ok()
            .and_then(QueryResponse::first_error)
        {
            return Err(StoreError::Statement(message));
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn run_write(&self, database: &str, policy: &str, body: String) -> Result<(), StoreError> {
        let response = self
            .http_client
            .post(self.base.join("write")?)
            .query(&[("db", database), ("precision", "s"), ("rp", policy)])
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl SeriesStore for InfluxClient {
    fn query<'a>(&'a self, statement: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        self.run_query(statement).boxed()
    }

    fn write<'a>(&'a self, database: &'a str, policy: &'a str, body: String) -> BoxFuture<'a, Result<(), StoreError>> {
        self.run_write(database, policy, body).boxed()
    }
}
