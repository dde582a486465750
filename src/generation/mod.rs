//! 생성 모델 모듈 - 프롬프트를 받아 응답 생성
//!
//! 모델 응답은 두 가지 모양 중 하나입니다.
//! - [`GenerationOutput::Fields`]: 이름 있는 필드의 맵 (`answer`, `finish_reason` 등)
//! - [`GenerationOutput::Text`]: 구조 없는 원문 텍스트
//!
//! 어떤 필드에서 답을 꺼낼지는 chain 의 추출 전략이 결정합니다.

mod gemini;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub use gemini::GeminiChat;

/// 생성 모델 출력
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutput {
    /// 필드 맵
    Fields(Map<String, Value>),
    /// 원문 텍스트
    Text(String),
}

impl GenerationOutput {
    /// `answer` 필드 하나만 가진 출력
    pub fn answer(text: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("answer".to_string(), Value::String(text.into()));
        GenerationOutput::Fields(fields)
    }

    /// 필드 조회 (Text 는 항상 None)
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            GenerationOutput::Fields(fields) => fields.get(key),
            GenerationOutput::Text(_) => None,
        }
    }
}

impl fmt::Display for GenerationOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationOutput::Fields(fields) => {
                write!(f, "{}", Value::Object(fields.clone()))
            }
            GenerationOutput::Text(text) => write!(f, "{}", text),
        }
    }
}

/// 생성 모델 트레이트
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// 완성된 프롬프트로 응답 생성
    async fn generate(&self, prompt: &str) -> Result<GenerationOutput>;

    /// 모델 ID
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_constructor() {
        let output = GenerationOutput::answer("ADHD affects attention.");
        assert_eq!(
            output.field("answer"),
            Some(&Value::String("ADHD affects attention.".to_string()))
        );
        assert_eq!(output.field("output"), None);
    }

    #[test]
    fn test_display() {
        let output = GenerationOutput::Text("plain".to_string());
        assert_eq!(output.to_string(), "plain");

        let mut fields = Map::new();
        fields.insert("score".to_string(), Value::from(3));
        assert_eq!(GenerationOutput::Fields(fields).to_string(), r#"{"score":3}"#);
    }
}
