//! Index Manifest - 인덱스 빌드 정보
//!
//! 인덱스 디렉토리의 `manifest.json` 에 어떤 임베딩 모델로, 어떤 청킹 설정으로
//! 인덱스를 만들었는지 기록합니다. 질의 시 같은 모델인지 확인하는 데 사용합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::canonical_model_id;

/// 매니페스트 파일 이름
pub const MANIFEST_FILE: &str = "manifest.json";

/// 인덱스 매니페스트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// 수집 실행 ID
    pub run_id: Uuid,
    /// 생성 시각 (UTC)
    pub created_at: DateTime<Utc>,
    /// 임베딩 모델 ID
    pub embedding_model: String,
    /// 임베딩 차원
    pub dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 로드된 문서(페이지) 수
    pub document_count: usize,
    /// 저장된 청크 수
    pub chunk_count: usize,
}

impl IndexManifest {
    /// 새 실행의 매니페스트
    pub fn new(
        embedding_model: &str,
        dimension: usize,
        chunk_size: usize,
        chunk_overlap: usize,
        document_count: usize,
        chunk_count: usize,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            embedding_model: embedding_model.to_string(),
            dimension,
            chunk_size,
            chunk_overlap,
            document_count,
            chunk_count,
        }
    }

    /// 인덱스 디렉토리 내 매니페스트 경로
    pub fn path_in(index_dir: &Path) -> PathBuf {
        index_dir.join(MANIFEST_FILE)
    }

    /// 매니페스트 저장
    pub async fn write(&self, index_dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        let path = Self::path_in(index_dir);
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// 매니페스트 읽기 (없으면 None)
    pub async fn read(index_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(index_dir);
        if !path.exists() {
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = serde_json::from_str(&json)
            .with_context(|| format!("Invalid manifest {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// 질의용 임베딩 모델과 호환되는지 확인
    ///
    /// 모델 ID 는 정규화하여 비교하므로 같은 모델의 별칭은 호환됩니다.
    pub fn check_compatible(&self, model: &str, dimension: usize) -> Result<(), String> {
        if canonical_model_id(&self.embedding_model) != canonical_model_id(model) {
            return Err(format!(
                "index was built with embedding model '{}' but '{}' is configured",
                self.embedding_model, model
            ));
        }
        if self.dimension != dimension {
            return Err(format!(
                "index dimension is {} but the embedding model produces {}",
                self.dimension, dimension
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_manifest_write_read() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = IndexManifest::new("all-MiniLM-L6-v2", 384, 500, 50, 3, 12);

        manifest.write(temp_dir.path()).await.unwrap();
        let loaded = IndexManifest::read(temp_dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn test_manifest_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(IndexManifest::read(temp_dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manifest_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        assert!(IndexManifest::read(temp_dir.path()).await.is_err());
    }

    #[test]
    fn test_check_compatible() {
        let manifest = IndexManifest::new("all-MiniLM-L6-v2", 384, 500, 50, 1, 1);
        assert!(manifest.check_compatible("all-MiniLM-L6-v2", 384).is_ok());

        let err = manifest.check_compatible("lexical-hash-v1", 384).unwrap_err();
        assert!(err.contains("all-MiniLM-L6-v2"));

        let err = manifest.check_compatible("all-MiniLM-L6-v2", 768).unwrap_err();
        assert!(err.contains("768"));
    }

    #[test]
    fn test_check_compatible_accepts_model_alias() {
        let manifest = IndexManifest::new("all-MiniLM-L6-v2", 384, 500, 50, 1, 1);
        assert!(manifest
            .check_compatible("sentence-transformers/all-MiniLM-L6-v2", 384)
            .is_ok());

        let manifest = IndexManifest::new("models/gemini-embedding-001", 768, 500, 50, 1, 1);
        assert!(manifest.check_compatible("gemini-embedding-001", 768).is_ok());
    }
}
