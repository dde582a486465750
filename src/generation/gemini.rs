//! Google Gemini 텍스트 생성 (generateContent)
//!
//! ref: https://ai.google.dev/api/generate-content

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{GenerationModel, GenerationOutput};
use crate::gemini::GeminiClient;

/// 응답 최대 토큰
const MAX_OUTPUT_TOKENS: u32 = 2048;
/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Gemini 채팅 모델
#[derive(Debug)]
pub struct GeminiChat {
    client: GeminiClient,
    model: String,
    temperature: f32,
}

impl GeminiChat {
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 모델 ID (예: `gemini-2.5-flash-lite`)
    /// * `temperature` - 생성 온도
    pub fn new(api_key: String, model: &str, temperature: f32) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key, REQUEST_TIMEOUT)?,
            model: model.trim().trim_start_matches("models/").to_string(),
            temperature,
        })
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(rename = "modelVersion", default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

/// 응답 본문을 GenerationOutput 으로 변환
///
/// JSON 이 아니면 원문을 `Text` 로, 그 외에는 첫 후보의 텍스트를 `answer` 필드에 담습니다.
/// 텍스트가 없는 경우(차단 등) `answer` 필드 없이 나머지 정보만 담깁니다.
fn parse_response(body: &str) -> GenerationOutput {
    let response: GenerateResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Unstructured generation response: {}", e);
            return GenerationOutput::Text(body.to_string());
        }
    };

    let mut fields = Map::new();

    if let Some(candidate) = response.candidates.into_iter().next() {
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if !text.is_empty() {
            fields.insert("answer".to_string(), Value::String(text));
        }
        if let Some(reason) = candidate.finish_reason {
            fields.insert("finish_reason".to_string(), Value::String(reason));
        }
    }

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        fields.insert("block_reason".to_string(), Value::String(reason));
    }
    if let Some(version) = response.model_version {
        fields.insert("model_version".to_string(), Value::String(version));
    }

    GenerationOutput::Fields(fields)
}

#[async_trait]
impl GenerationModel for GeminiChat {
    async fn generate(&self, prompt: &str) -> Result<GenerationOutput> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        tracing::debug!("Calling {} ({} prompt chars)", self.model, prompt.chars().count());

        let body = self
            .client
            .post(&self.model, "generateContent", &request)
            .await?;

        Ok(parse_response(&body))
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

    #[test]
    fn test_model_prefix_normalized() {
        let chat = GeminiChat::new("fake_key".to_string(), "models/gemini-2.5-flash-lite", 0.3)
            .unwrap();
        assert_eq!(chat.name(), "gemini-2.5-flash-lite");
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: "hello" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 10,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["temperature"], 0.5);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 10);
    }

    #[test]
    fn test_parse_response_joins_parts() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "ASD affects "}, {"text": "social communication."}]},
                "finishReason": "STOP"
            }],
            "modelVersion": "gemini-2.5-flash-lite"
        }"#;
        let output = parse_response(body);
        assert_eq!(
            output.field("answer"),
            Some(&Value::String("ASD affects social communication.".to_string()))
        );
        assert_eq!(
            output.field("finish_reason"),
            Some(&Value::String("STOP".to_string()))
        );
    }

    #[test]
    fn test_parse_blocked_response_has_no_answer() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let output = parse_response(body);
        assert_eq!(output.field("answer"), None);
        assert_eq!(
            output.field("block_reason"),
            Some(&Value::String("SAFETY".to_string()))
        );
    }

    #[test]
    fn test_parse_non_json_response() {
        let output = parse_response("upstream says hi");
        assert_eq!(output, GenerationOutput::Text("upstream says hi".to_string()));
    }
}
