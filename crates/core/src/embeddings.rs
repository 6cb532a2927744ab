use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Cosine similarity of two vectors; 0.0 when either is empty, zero, or the
/// lengths differ.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Hashes character trigrams into a fixed number of buckets. Deterministic and
/// offline; used when no embedding endpoint is configured.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = format!(" {} ", text.to_lowercase());
        let chars: Vec<char> = lowered.chars().collect();

        if text.trim().is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, SearchError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            endpoint: base.join("embeddings")?,
            api_key,
            model: model.into(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| SearchError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "empty embedding response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(input_count = texts.len(), model = %self.model, "embedding texts");

        let mut request = self.client.post(self.endpoint.clone()).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|item| item.index);

        if parsed.data.len() != texts.len() {
            return Err(SearchError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("expected {} vectors, got {}", texts.len(), parsed.data.len()),
            });
        }

        parsed
            .data
            .into_iter()
            .map(|item| {
                if item.embedding.len() != self.dimensions {
                    Err(SearchError::DimensionMismatch {
                        expected: self.dimensions,
                        actual: item.embedding.len(),
                    })
                } else {
                    Ok(item.embedding)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, CharacterNgramEmbedder, Embedder};

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Senior Python developer").await.expect("embed");
        let second = embedder.embed("Senior Python developer").await.expect("embed");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await.expect("embed");
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn similar_phrasing_scores_higher_than_unrelated_text() {
        let embedder = CharacterNgramEmbedder::default();
        let base = embedder.embed_sync("PostgreSQL");
        let close = embedder.embed_sync("Postgres SQL");
        let far = embedder.embed_sync("Forklift operation");
        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        let same = cosine_similarity(&[0.6, 0.8], &[0.6, 0.8]);
        assert!((same - 1.0).abs() < 1e-9);
    }
}
