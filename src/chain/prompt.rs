//! 프롬프트 템플릿
//!
//! 템플릿에는 `{context}` 와 `{input}` 두 자리표시자가 정확히 한 번씩 있어야 합니다.
//! 문서에 없는 질문에 대한 응답 규칙은 오케스트레이터가 아닌 템플릿이 정합니다.

use std::path::Path;

use crate::error::ConfigError;
use crate::knowledge::SearchResult;

const CONTEXT_SLOT: &str = "{context}";
const INPUT_SLOT: &str = "{input}";

/// 문서에서 답을 찾지 못했을 때의 고정 응답
pub const NOT_FOUND_MESSAGE: &str =
    "I cannot find this specific information in the provided documents.";

/// 기본 템플릿
pub const DEFAULT_TEMPLATE: &str = r#"You are a helpful medical assistant specializing in Neurodevelopmental Disorders.

**Instructions:**
1. **First priority**: If the answer is found in the context below, answer using ONLY that information.
2. **Greetings and basic questions** (such as "hi", "hello", "what can you do?", "who are you?"):
   - Reply politely and briefly describe what this specialized assistant can do.
3. **General questions unrelated to Neurodevelopmental Disorders**:
   - Give a brief, helpful answer.
   - Add: "Note: This question is not directly related to our specialized database on Neurodevelopmental Disorders."
4. **Medical questions about Neurodevelopmental Disorders that the context does not answer**:
   - Reply exactly: "I cannot find this specific information in the provided documents."

<context>
{context}
</context>

Question: {input}

Remember: prefer information from the context whenever it is available, and stay friendly for basic interactions.
"#;

/// 검증된 프롬프트 템플릿
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// 템플릿 문자열 검증 후 생성
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();

        for slot in [CONTEXT_SLOT, INPUT_SLOT] {
            let count = template.matches(slot).count();
            if count != 1 {
                return Err(ConfigError::Template {
                    reason: format!("expected exactly one {} placeholder, found {}", slot, count),
                });
            }
        }

        Ok(Self { template })
    }

    /// 파일에서 로드
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let template = std::fs::read_to_string(path).map_err(|e| ConfigError::Template {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::new(template)
    }

    /// 설정 파일이 있으면 파일에서, 없으면 기본 템플릿
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                tracing::info!("Using prompt template from {}", path.display());
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// 자리표시자 치환
    ///
    /// 한 번에 치환하므로 context 나 input 안의 `{...}` 문자열은 그대로 남습니다.
    pub fn render(&self, context: &str, input: &str) -> String {
        let mut prompt = String::with_capacity(self.template.len() + context.len() + input.len());

        for (i, part) in self.template.split(CONTEXT_SLOT).enumerate() {
            if i > 0 {
                prompt.push_str(context);
            }
            for (j, piece) in part.split(INPUT_SLOT).enumerate() {
                if j > 0 {
                    prompt.push_str(input);
                }
                prompt.push_str(piece);
            }
        }

        prompt
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// 검색된 청크 텍스트를 빈 줄로 이어 context 생성
pub fn format_context(passages: &[SearchResult]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str) -> SearchResult {
        SearchResult {
            source: "doc.txt".to_string(),
            page: None,
            chunk_index: 0,
            text: text.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn test_default_template_is_valid() {
        let template = PromptTemplate::new(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(template, PromptTemplate::default());
        assert!(DEFAULT_TEMPLATE.contains(NOT_FOUND_MESSAGE));
    }

    #[test]
    fn test_render() {
        let template = PromptTemplate::new("C: {context}\nQ: {input}").unwrap();
        assert_eq!(
            template.render("some facts", "a question"),
            "C: some facts\nQ: a question"
        );
    }

    #[test]
    fn test_render_does_not_expand_placeholders_in_values() {
        let template = PromptTemplate::new("{context}|{input}").unwrap();
        assert_eq!(
            template.render("ctx {input}", "q {context}"),
            "ctx {input}|q {context}"
        );
    }

    #[test]
    fn test_template_requires_both_placeholders_once() {
        assert!(PromptTemplate::new("only {context}").is_err());
        assert!(PromptTemplate::new("only {input}").is_err());
        assert!(PromptTemplate::new("{context} {context} {input}").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("prompt.txt");
        std::fs::write(&path, "Context:\n{context}\nAsk: {input}").unwrap();

        let template = PromptTemplate::load(Some(&path)).unwrap();
        assert!(template.as_str().starts_with("Context:"));

        let missing = PromptTemplate::load(Some(&temp_dir.path().join("nope.txt")));
        assert!(matches!(missing, Err(ConfigError::Template { .. })));
    }

    #[test]
    fn test_format_context_joins_with_blank_line() {
        let passages = vec![passage("first"), passage("second")];
        assert_eq!(format_context(&passages), "first\n\nsecond");
        assert_eq!(format_context(&[]), "");
    }
}
