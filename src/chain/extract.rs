//! 응답 추출 - GenerationOutput 에서 답변 문자열 꺼내기
//!
//! 전략을 순서대로 시도하여 처음 성공한 결과를 사용합니다.
//! 모든 전략이 실패하면 출력 전체를 문자열로 만듭니다. 키가 없다고 실패하지 않습니다.

use serde_json::Value;

use crate::generation::GenerationOutput;

/// 추출 전략
pub type ExtractionStrategy = fn(&GenerationOutput) -> Option<String>;

/// 기본 전략 순서: `answer` -> `output` -> `text` -> 원문 텍스트
pub const DEFAULT_STRATEGIES: [ExtractionStrategy; 4] =
    [answer_field, output_field, text_field, raw_text];

fn field_text(output: &GenerationOutput, key: &str) -> Option<String> {
    match output.field(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn answer_field(output: &GenerationOutput) -> Option<String> {
    field_text(output, "answer")
}

fn output_field(output: &GenerationOutput) -> Option<String> {
    field_text(output, "output")
}

fn text_field(output: &GenerationOutput) -> Option<String> {
    field_text(output, "text")
}

fn raw_text(output: &GenerationOutput) -> Option<String> {
    match output {
        GenerationOutput::Text(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

/// 주어진 전략 순서로 답변 추출
pub fn extract_with(output: &GenerationOutput, strategies: &[ExtractionStrategy]) -> String {
    strategies
        .iter()
        .find_map(|strategy| strategy(output))
        .unwrap_or_else(|| output.to_string())
}

/// 기본 전략으로 답변 추출
pub fn extract_answer(output: &GenerationOutput) -> String {
    extract_with(output, &DEFAULT_STRATEGIES)
}
