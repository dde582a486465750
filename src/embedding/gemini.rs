//! Google Gemini 임베딩 (batchEmbedContents)
//!
//! 청크는 `RETRIEVAL_DOCUMENT`, 검색 질의는 `RETRIEVAL_QUERY` task type 으로 임베딩합니다.
//!
//! ref: https://ai.google.dev/gemini-api/docs/embeddings

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::gemini::GeminiClient;

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;
/// 모델이 지원하는 출력 차원
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];
/// batchEmbedContents 한 번에 보낼 최대 텍스트 수
const MAX_BATCH: usize = 100;
/// 무료 티어 분당 요청 수
const REQUESTS_PER_MINUTE: u32 = 60;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

/// Gemini 임베딩 API 백엔드
#[derive(Debug)]
pub struct GeminiEmbedding {
    client: GeminiClient,
    model: String,
    dimension: usize,
}

impl GeminiEmbedding {
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 모델 ID (`gemini-embedding-001` 또는 `models/...`)
    /// * `dimension` - 출력 차원 (768, 1536, 3072)
    pub fn new(api_key: String, model: &str, dimension: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Unsupported Gemini embedding dimension {}, expected one of {:?}",
                dimension,
                SUPPORTED_DIMENSIONS
            );
        }

        let client =
            GeminiClient::new(api_key, REQUEST_TIMEOUT)?.with_rate_limit(REQUESTS_PER_MINUTE);

        Ok(Self {
            client,
            model: model.trim().trim_start_matches("models/").to_string(),
            dimension,
        })
    }

    fn batch_request<'a>(&self, texts: &'a [String], task_type: TaskType) -> BatchRequest<'a> {
        BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type,
                    output_dimensionality: self.dimension,
                })
                .collect(),
        }
    }

    async fn embed_as(&self, texts: &[String], task_type: TaskType) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            let request = self.batch_request(batch, task_type);
            let body = self
                .client
                .post(&self.model, "batchEmbedContents", &request)
                .await?;
            let response: BatchResponse =
                serde_json::from_str(&body).context("Failed to parse embedding response")?;

            if response.embeddings.len() != batch.len() {
                anyhow::bail!(
                    "Gemini returned {} embeddings for {} texts",
                    response.embeddings.len(),
                    batch.len()
                );
            }
            for embedding in response.embeddings {
                if embedding.values.len() != self.dimension {
                    anyhow::bail!(
                        "Gemini returned a {}-d embedding, expected {}",
                        embedding.values.len(),
                        self.dimension
                    );
                }
                vectors.push(embedding.values);
            }
        }

        Ok(vectors)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: TaskType,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_as(&[text.to_string()], TaskType::RetrievalDocument)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Gemini returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_as(texts, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_as(&[query.to_string()], TaskType::RetrievalQuery)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Gemini returned no embedding"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(dimension: usize) -> GeminiEmbedding {
        GeminiEmbedding::new("fake_key".to_string(), "models/gemini-embedding-001", dimension)
            .unwrap()
    }

    #[test]
    fn test_unsupported_dimension() {
        let err = GeminiEmbedding::new("fake_key".to_string(), "gemini-embedding-001", 384)
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported Gemini embedding dimension 384"));
    }

    #[test]
    fn test_model_prefix_normalized() {
        let embedder = embedder(1536);
        assert_eq!(embedder.name(), "gemini-embedding-001");
        assert_eq!(embedder.dimension(), 1536);
    }

    #[test]
    fn test_batch_request_shape() {
        let embedder = embedder(768);
        let texts = vec!["ADHD".to_string(), "Dyslexia".to_string()];
        let json =
            serde_json::to_value(embedder.batch_request(&texts, TaskType::RetrievalQuery)).unwrap();

        let requests = json["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["model"], "models/gemini-embedding-001");
        assert_eq!(requests[0]["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(requests[0]["outputDimensionality"], 768);
        assert_eq!(requests[1]["content"]["parts"][0]["text"], "Dyslexia");
    }

    #[test]
    fn test_document_task_type_name() {
        let json = serde_json::to_value(TaskType::RetrievalDocument).unwrap();
        assert_eq!(json, "RETRIEVAL_DOCUMENT");
    }

    #[test]
    fn test_parse_batch_response() {
        let body = r#"{"embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3, 0.4]}]}"#;
        let response: BatchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[1].values, vec![0.3, 0.4]);
    }
}
