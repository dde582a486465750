//! 대화 - 사용자/어시스턴트 턴의 순서 있는 기록
//!
//! 대화 값은 호출자가 소유하며, 각 턴 처리 시 넘겨주고 갱신된 값을 돌려받습니다.
//! 질의 실패는 대화를 끊지 않고 `❌ ...` 어시스턴트 턴으로 기록됩니다.

use std::fmt;

use crate::chain::RagChain;
use crate::error::RagError;

/// 예시 질문 (신경발달장애)
pub const SUGGESTIONS: [&str; 15] = [
    "What is the definition of a Neurodevelopmental Disorder?",
    "What are the core symptoms of Autism Spectrum Disorder (ASD)?",
    "Briefly explain what ADHD is.",
    "What is Dyslexia?",
    "What is the estimated prevalence of autism according to the documents?",
    "Are there specific genetic factors linked to neurodevelopmental disorders?",
    "What are the common comorbidities associated with ADHD?",
    "What does the text say about early intervention strategies?",
    "How do the symptoms of ADHD differ from those of Autism?",
    "Compare the treatment approaches for Dyslexia vs. Dyscalculia.",
    "What is the relationship between environmental factors and neurodevelopmental disorders?",
    "What are the diagnostic criteria for Autism Spectrum Disorder?",
    "How does early intervention impact children with neurodevelopmental disorders?",
    "What role does genetics play in ADHD?",
    "What are the characteristics of Dyscalculia?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// 대화 턴
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// 대화 기록 (추가만 가능)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 마지막 턴
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// 턴 추가
    pub fn with_turn(mut self, role: Role, content: impl Into<String>) -> Self {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
        self
    }
}

/// 한 턴 처리: 사용자 입력과 어시스턴트 응답(또는 에러 메시지)을 추가
pub async fn process_turn(conversation: Conversation, chain: &RagChain, input: &str) -> Conversation {
    let conversation = conversation.with_turn(Role::User, input);

    let reply = match chain.answer(input).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!("Query failed: {}", e);
            format!("❌ {}", RagError::from(e))
        }
    };

    conversation.with_turn(Role::Assistant, reply)
}

/// 입력이 예시 번호(1..=N)면 해당 질문, 아니면 입력 그대로
pub fn resolve_suggestion(input: &str) -> &str {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=SUGGESTIONS.len()).contains(&n) => SUGGESTIONS[n - 1],
        _ => input,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::chain::PromptTemplate;
    use crate::embedding::LexicalEmbedding;
    use crate::generation::{GenerationModel, GenerationOutput};
    use crate::knowledge::{IndexRecord, SearchResult, VectorStore};

    struct EmptyStore;

    #[async_trait]
    impl VectorStore for EmptyStore {
        async fn write(&self, records: &[IndexRecord]) -> Result<usize> {
            Ok(records.len())
        }

        async fn query(&self, _embedding: &[f32], _k: usize) -> Result<Vec<SearchResult>> {
            Ok(vec![])
        }

        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    struct EchoModel;

    #[async_trait]
    impl GenerationModel for EchoModel {
        async fn generate(&self, prompt: &str) -> Result<GenerationOutput> {
            if prompt.contains("fail") {
                anyhow::bail!("503 Service Unavailable");
            }
            Ok(GenerationOutput::answer("echo"))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn chain() -> RagChain {
        RagChain::new(
            Arc::new(LexicalEmbedding::new()),
            Arc::new(EmptyStore),
            Arc::new(EchoModel),
            PromptTemplate::new("{context}{input}").unwrap(),
            5,
        )
    }

    #[tokio::test]
    async fn test_process_turn_appends_user_then_assistant() {
        let chain = chain();
        let conversation = process_turn(Conversation::new(), &chain, "hello").await;

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[0].role, Role::User);
        assert_eq!(conversation.turns()[0].content, "hello");
        assert_eq!(conversation.turns()[1].role, Role::Assistant);
        assert_eq!(conversation.turns()[1].content, "echo");
    }

    #[tokio::test]
    async fn test_failed_turn_becomes_error_message_and_session_continues() {
        let chain = chain();
        let conversation = process_turn(Conversation::new(), &chain, "please fail").await;
        let last = conversation.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.starts_with("❌ Error generating response:"));
        assert!(last.content.contains("503 Service Unavailable"));

        let conversation = process_turn(conversation, &chain, "again").await;
        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation.last().unwrap().content, "echo");
    }

    #[test]
    fn test_resolve_suggestion() {
        assert_eq!(resolve_suggestion("1"), SUGGESTIONS[0]);
        assert_eq!(resolve_suggestion(" 15 "), SUGGESTIONS[14]);
        assert_eq!(resolve_suggestion("0"), "0");
        assert_eq!(resolve_suggestion("16"), "16");
        assert_eq!(resolve_suggestion("What is ADHD?"), "What is ADHD?");
    }
}
