use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Answer from the retrieval-augmented collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistAnswer {
    pub answer: String,
    #[serde(default)]
    pub cited_sources: Vec<CitedSource>,
    #[serde(default)]
    pub cited_document_keys: Vec<String>,
}

/// A retrieved message the answer cites.
#[derive(Debug, Clone, Deserialize)]
pub struct CitedSource {
    pub content: String,
    pub author_id: String,
    pub created_at: String,
}

/// Message metadata shipped to vector storage for later retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub message_id: i64,
    pub content: String,
    pub author_id: String,
    pub channel_id: i64,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<i64>,
}

/// HTTP client for the embedding / vector-search / LLM pipeline. The pipeline
/// internals are external; we consume exactly two calls.
#[derive(Clone)]
pub struct AssistClient {
    http: reqwest::Client,
    base_url: String,
}

impl AssistClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Ask the collaborator a question; returns the answer plus citations.
    pub async fn answer(&self, query: &str) -> anyhow::Result<AssistAnswer> {
        let answer = self
            .http
            .post(format!("{}/answer", self.base_url))
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?
            .error_for_status()?
            .json::<AssistAnswer>()
            .await?;
        Ok(answer)
    }

    /// Embed and upsert one message into vector storage.
    pub async fn vectorize(&self, record: &VectorRecord) -> anyhow::Result<()> {
        self.http
            .post(format!("{}/vectorize", self.base_url))
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
