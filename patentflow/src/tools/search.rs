//! Patent-search capability.

use super::{Tool, ToolDefinition};
use crate::errors::CapabilityError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const MIN_RESULTS: u32 = 10;
const MAX_RESULTS: u32 = 100;

/// A normalized `search_patents` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Keywords, e.g. `(sensor OR detector)`.
    pub query: String,
    /// Country code such as `CN` or `US`.
    pub country: String,
    /// `GRANT` or `APPLICATION`.
    pub status: String,
    /// `new` or `old`; `None` means relevance.
    pub sort: Option<String>,
    /// Result count, clamped to 10..=100.
    pub num: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Num {
    Int(u32),
    Text(String),
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    sort: String,
    num: Option<Num>,
}

impl SearchQuery {
    fn from_args(args: SearchArgs) -> Self {
        let num = match args.num {
            Some(Num::Int(n)) => n,
            Some(Num::Text(s)) => s.trim().parse().unwrap_or(MIN_RESULTS),
            None => MIN_RESULTS,
        };
        let sort = match args.sort.trim() {
            "" | "relevance" => None,
            other => Some(other.to_string()),
        };
        Self {
            query: args.query,
            country: args.country,
            status: args.status,
            sort,
            num: num.clamp(MIN_RESULTS, MAX_RESULTS),
        }
    }

    /// Query-string parameters for the `google_patents` engine, without the key.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("engine", "google_patents".to_string()),
            ("q", self.query.clone()),
            ("num", self.num.to_string()),
        ];
        if !self.country.is_empty() {
            params.push(("country", self.country.clone()));
        }
        if !self.status.is_empty() {
            params.push(("status", self.status.clone()));
        }
        if let Some(sort) = &self.sort {
            params.push(("sort", sort.clone()));
        }
        params
    }
}

/// Searches an external patent database.
#[async_trait]
pub trait PatentSearch: Send + Sync {
    /// Runs a search and returns result text.
    async fn search(&self, query: &SearchQuery) -> Result<String, CapabilityError>;
}

/// A search backend that always reports itself unavailable.
#[derive(Debug, Clone)]
pub struct UnavailableSearch {
    reason: String,
}

impl UnavailableSearch {
    /// Creates an unavailable backend with a reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PatentSearch for UnavailableSearch {
    async fn search(&self, _query: &SearchQuery) -> Result<String, CapabilityError> {
        Err(CapabilityError::Unavailable(self.reason.clone()))
    }
}

/// SerpApi `google_patents` backend.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct SerpApiSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
}

#[cfg(feature = "http")]
impl SerpApiSearch {
    /// Creates a backend from configuration. The key is read from the
    /// environment now; a missing key makes every search unavailable.
    #[must_use]
    pub fn from_config(config: &crate::config::SearchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl PatentSearch for SerpApiSearch {
    async fn search(&self, query: &SearchQuery) -> Result<String, CapabilityError> {
        let Some(api_key) = &self.api_key else {
            return Err(CapabilityError::Unavailable(format!(
                "{} is not configured",
                self.api_key_env
            )));
        };

        let mut params = query.params();
        params.push(("api_key", api_key.clone()));

        tracing::debug!(q = %query.query, num = query.num, "searching patents");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| CapabilityError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Http(format!("{status}: {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CapabilityError::Http(format!("invalid response: {e}")))?;
        let results = body.get("organic_results").unwrap_or(&body);
        serde_json::to_string_pretty(results).map_err(|e| CapabilityError::Http(e.to_string()))
    }
}

/// The `search_patents` tool.
pub struct SearchTool {
    backend: Arc<dyn PatentSearch>,
}

impl SearchTool {
    /// Wraps a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn PatentSearch>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("search_patents")
            .with_description("Search Google Patents for similar patents.")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Keywords, formatted as (kw1 OR kw2 OR ...)"},
                    "country": {"type": "string", "description": "CN for China, US for the United States"},
                    "status": {"type": "string", "description": "GRANT or APPLICATION"},
                    "sort": {"type": "string", "description": "relevance, new or old"},
                    "num": {"type": "string", "description": "Number of results, 10 to 100"}
                },
                "required": ["query"]
            }))
    }

    async fn call(&self, arguments: serde_json::Value) -> String {
        let args: SearchArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return CapabilityError::invalid("search_patents", e.to_string()).to_string(),
        };
        let query = SearchQuery::from_args(args);
        self.backend
            .search(&query)
            .await
            .unwrap_or_else(|e| e.to_string())
    }
}
