//! 에러 타입
//!
//! 설정 / 수집(ingestion) / 질의(query) 세 가지 경로로 에러를 구분합니다.
//! - 설정 에러와 수집 에러: 치명적 (프로세스 중단)
//! - 질의 에러: 대화 경계에서 메시지로 변환되어 세션은 계속 유지

use std::path::PathBuf;

/// 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Error generating response: {0}")]
    Query(#[from] QueryError),
}

/// 설정 에러 (치명적)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GOOGLE_API_KEY not found. Set it in the environment or in a .env file")]
    MissingCredential,

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("vector index not found at {path}. Run `neuro-rag ingest` first")]
    IndexMissing { path: PathBuf },

    #[error("vector index at {path} is empty. Run `neuro-rag ingest` first")]
    IndexEmpty { path: PathBuf },

    #[error("vector index is incompatible with the configured embedder: {reason}")]
    IndexIncompatible { reason: String },

    #[error("invalid prompt template: {reason}")]
    Template { reason: String },

    #[error("failed to initialize {component}: {message}")]
    Backend {
        component: &'static str,
        message: String,
    },
}

/// 수집 에러 (수집 실행 전체 중단)
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("source directory not found: {path}")]
    SourceMissing { path: PathBuf },

    #[error("no documents found in {path}")]
    NoDocuments { path: PathBuf },

    #[error("failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("failed to embed chunks: {message}")]
    Embedding { message: String },

    #[error("failed to write vector index: {message}")]
    Write { message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 질의 에러 (질의 단위로 처리)
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query embedding failed: {message}")]
    Embedding { message: String },

    #[error("retrieval failed: {message}")]
    Retrieval { message: String },

    #[error("generation failed: {message}")]
    Generation { message: String },
}

impl ConfigError {
    /// 하위 컴포넌트 초기화 실패를 설정 에러로 변환
    pub fn backend(component: &'static str, err: &anyhow::Error) -> Self {
        Self::Backend {
            component,
            message: format!("{:#}", err),
        }
    }
}

/// anyhow 에러 체인을 한 줄 메시지로
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display_prefix() {
        let err: RagError = QueryError::Generation {
            message: "503 Service Unavailable".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Error generating response: generation failed: 503 Service Unavailable"
        );
    }

    #[test]
    fn test_backend_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("Failed to connect to LanceDB");
        let err = ConfigError::backend("vector index", &inner);
        let text = err.to_string();
        assert!(text.contains("vector index"));
        assert!(text.contains("Failed to connect to LanceDB"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_ingest_wraps_config_transparently() {
        let err: IngestError = ConfigError::InvalidChunking {
            size: 50,
            overlap: 50,
        }
        .into();
        assert!(err.to_string().starts_with("chunk overlap (50)"));
    }
}
