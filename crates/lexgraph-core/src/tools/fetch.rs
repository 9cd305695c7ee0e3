//! Article fetch tool
//!
//! Retrieves the current text of an article from an external normative
//! archive. The remote service is treated as a possibly-slow collaborator:
//! its latency is bounded by the client timeout and a failure never takes
//! down the calling expert.

use crate::error::{LexGraphError, Result};
use crate::tools::{arg_str, ParameterKind, Tool, ToolArgs, ToolParameter};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub struct ArticleFetchTool {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ArticleResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    urn: String,
}

impl ArticleFetchTool {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(LexGraphError::Http)?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Tool for ArticleFetchTool {
    fn name(&self) -> &str {
        "article_fetch"
    }

    fn description(&self) -> &str {
        "Fetch the current text of an article from the external normative archive"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "tipo_atto",
                ParameterKind::String,
                "Act type (codice civile, codice penale, legge, ...)",
            ),
            ToolParameter::required(
                "numero_articolo",
                ParameterKind::String,
                "Article number (e.g. 1453, 52)",
            ),
            ToolParameter::optional("data_atto", ParameterKind::String, "Act date (YYYY-MM-DD)"),
            ToolParameter::optional("numero_atto", ParameterKind::String, "Act number"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value> {
        let tipo_atto = arg_str(&args, "tipo_atto").unwrap_or_default();
        let numero_articolo = arg_str(&args, "numero_articolo").unwrap_or_default();

        let mut query: Vec<(&str, &str)> = vec![
            ("tipo_atto", tipo_atto),
            ("numero_articolo", numero_articolo),
        ];
        if let Some(data_atto) = arg_str(&args, "data_atto") {
            query.push(("data_atto", data_atto));
        }
        if let Some(numero_atto) = arg_str(&args, "numero_atto") {
            query.push(("numero_atto", numero_atto));
        }

        let url = format!("{}/articolo", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(LexGraphError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(LexGraphError::ExternalError(format!(
                "article fetch failed (HTTP {}): {} art. {}",
                status, tipo_atto, numero_articolo
            )));
        }

        let article: ArticleResponse = response.json().await.map_err(LexGraphError::Http)?;

        if article.text.is_empty() {
            return Err(LexGraphError::ExternalError(format!(
                "article not found: {} art. {}",
                tipo_atto, numero_articolo
            )));
        }

        Ok(json!({
            "text": article.text,
            "urn": article.urn,
        }))
    }
}
