//! 해시 기반 어휘 임베딩
//!
//! 토큰을 SHA-256 으로 해싱하여 고정 차원 버킷에 누적하는 bag-of-words 임베딩입니다.
//! 네트워크나 모델 파일 없이 동작하며, 같은 텍스트는 항상 같은 벡터를 만듭니다.
//! 결과는 항상 단위 벡터입니다 (불용어뿐인 텍스트는 불용어로, 토큰이 없으면 빈 토큰으로 해싱).

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// 모델 ID
pub const LEXICAL_MODEL_ID: &str = "lexical-hash-v1";

/// 벡터 차원
pub const LEXICAL_DIMENSION: usize = 384;

/// 의미 없는 영어 불용어
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was",
    "what", "when", "which", "who", "why", "with",
];

/// 해시 bag-of-words 임베딩
#[derive(Debug, Clone, Default)]
pub struct LexicalEmbedding;

impl LexicalEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; LEXICAL_DIMENSION];

        let mut tokens: Vec<String> = tokenize(text).collect();
        if tokens.is_empty() {
            tokens = raw_tokens(text).collect();
        }
        if tokens.is_empty() {
            tokens.push(String::new());
        }

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % LEXICAL_DIMENSION as u64) as usize;
            // 부호 해싱으로 충돌 편향 완화
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        // 같은 버킷에서 부호가 상쇄되면 영벡터가 될 수 있음
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

/// 소문자 영숫자 토큰 (불용어 제외)
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    raw_tokens(text).filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn raw_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for LexicalEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        LEXICAL_DIMENSION
    }

    fn name(&self) -> &str {
        LEXICAL_MODEL_ID
    }
}
