//! Vector store contract and Qdrant REST client
//!
//! The core consumes a single capability: `query_points(collection, vector,
//! limit)` returning scored points with a JSON payload. Point ids may be
//! UUIDs, integers or arbitrary strings depending on how the collection was
//! ingested; non-UUID ids are mapped to UUIDs through a stable MD5 hash.

use crate::error::{LexGraphError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Point id as returned by the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Uuid(Uuid),
    Int(u64),
    Str(String),
}

impl PointId {
    /// Map the id into UUID space.
    ///
    /// UUIDs pass through; integers and other strings hash through MD5, which
    /// keeps ids stable across runs.
    pub fn as_chunk_id(&self) -> Uuid {
        match self {
            Self::Uuid(u) => *u,
            Self::Int(n) => uuid_from_md5(&n.to_string()),
            Self::Str(s) => s.parse().unwrap_or_else(|_| uuid_from_md5(s)),
        }
    }
}

fn uuid_from_md5(input: &str) -> Uuid {
    let digest = md5::compute(input.as_bytes());
    Uuid::from_bytes(digest.0)
}

/// Scored point returned by a vector similarity query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f64,
    #[serde(default)]
    pub payload: Value,
}

impl ScoredPoint {
    /// Chunk text from the payload, empty if absent
    pub fn text(&self) -> &str {
        self.payload
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// Vector similarity search capability consumed by the retriever
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Query the top `limit` points nearest to `query_vector`
    async fn query_points(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;
}

/// Qdrant client over the REST query API
pub struct QdrantHttpStore {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct QueryPointsRequest<'a> {
    query: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct QueryPointsResponse {
    result: QueryPointsResult,
}

#[derive(Deserialize)]
struct QueryPointsResult {
    points: Vec<ScoredPoint>,
}

impl QdrantHttpStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(LexGraphError::Http)?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantHttpStore {
    async fn query_points(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let url = format!("{}/collections/{}/points/query", self.base_url, collection);
        let body = QueryPointsRequest {
            query: query_vector,
            limit,
            with_payload: true,
        };

        let mut req = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("api-key", key);
        }

        let response = req.send().await.map_err(LexGraphError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LexGraphError::VectorStore(format!(
                "query_points failed (HTTP {}): {}",
                status, body
            )));
        }

        let parsed: QueryPointsResponse = response.json().await.map_err(LexGraphError::Http)?;
        Ok(parsed.result.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_pass_through() {
        let id = Uuid::new_v4();
        assert_eq!(PointId::Uuid(id).as_chunk_id(), id);
    }

    #[test]
    fn integer_ids_map_deterministically() {
        let a = PointId::Int(42).as_chunk_id();
        let b = PointId::Int(42).as_chunk_id();
        let c = PointId::Int(43).as_chunk_id();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn uuid_strings_parse_without_hashing() {
        let id = Uuid::new_v4();
        assert_eq!(PointId::Str(id.to_string()).as_chunk_id(), id);
    }

    #[test]
    fn arbitrary_strings_hash() {
        let a = PointId::Str("chunk-7".to_string()).as_chunk_id();
        let b = PointId::Str("chunk-7".to_string()).as_chunk_id();
        assert_eq!(a, b);
    }

    #[test]
    fn point_id_deserializes_untagged() {
        let p: ScoredPoint =
            serde_json::from_str(r#"{"id": 7, "score": 0.9, "payload": {"text": "x"}}"#).unwrap();
        assert_eq!(p.id, PointId::Int(7));
        assert_eq!(p.text(), "x");

        let p: ScoredPoint = serde_json::from_str(
            r#"{"id": "3e2b9ad0-9d2c-4b2e-8b1a-0a1b2c3d4e5f", "score": 0.5}"#,
        )
        .unwrap();
        assert!(matches!(p.id, PointId::Uuid(_)));
        assert_eq!(p.text(), "");
    }
}
