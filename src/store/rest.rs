//! REST store client (PostgREST dialect)
//!
//! `GET/POST/PATCH {base}/rest/v1/{table}` with filters passed as query
//! parameters (`status=eq.pending_guardian`) and `Prefer: return=representation`
//! so writes return the rows they touched.

use super::{ApprovalStore, Filter, OrderBy};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use url::Url;

const REST_PREFIX: &str = "rest/v1/";

pub struct RestStore {
    client: Client,
    base: Url,
    api_key: SecretString,
}

impl RestStore {
    pub fn new(base: Url, api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            base,
            api_key,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(REST_PREFIX)
            .and_then(|u| u.join(table))
            .map_err(|e| Error::Config(format!("Invalid store URL: {}", e)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        builder
            .header("apikey", key)
            .bearer_auth(key)
            .header("Accept", "application/json")
    }

    async fn rows(response: Response, table: &str) -> Result<Vec<Value>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(table = %table, status = %status, "Store request failed");
            return Err(Error::Network(format!(
                "Store returned {} for {}: {}",
                status, table, body
            )));
        }
        let value: Value = response.json().await?;
        match value {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }
}

#[async_trait]
impl ApprovalStore for RestStore {
    async fn insert(&self, table: &str, record: Value) -> Result<Vec<Value>> {
        let url = self.table_url(table)?;
        let response = self
            .authorize(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await?;
        Self::rows(response, table).await
    }

    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Value>> {
        let url = self.table_url(table)?;
        let mut query = filter.to_query_pairs();
        query.push(("select".to_string(), "*".to_string()));
        if let Some(order) = order {
            query.push(("order".to_string(), order.to_string()));
        }

        tracing::debug!(table = %table, filter = %filter, "Store select");
        let response = self
            .authorize(self.client.get(url))
            .query(&query)
            .send()
            .await?;
        Self::rows(response, table).await
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
        if filter.predicates().is_empty() {
            return Err(Error::InvalidArgument(
                "refusing unfiltered update".to_string(),
            ));
        }
        let url = self.table_url(table)?;
        let response = self
            .authorize(self.client.patch(url))
            .query(&filter.to_query_pairs())
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Self::rows(response, table).await
    }
}
