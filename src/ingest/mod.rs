//! 수집(ingestion) 실행 - 문서 로드, 청킹, 임베딩, 인덱스 쓰기
//!
//! 인덱스는 항상 새로 만듭니다 (clear-then-write).
//! 대상 옆의 staging 디렉토리에 모든 레코드를 쓴 뒤에만 대상과 교체하므로,
//! 실패한 실행은 기존 인덱스를 건드리지 않습니다.
//! 교체 중에는 기존 인덱스를 `<index_dir>.previous` 로 옮겨 두었다가,
//! 새 인덱스가 자리를 잡은 뒤에 지웁니다.
//! 문서가 하나도 없으면 인덱스 디렉토리를 만들거나 바꾸지 않고 실패합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::error::{describe, IngestError};
use crate::knowledge::{split, Chunk, IndexManifest, IndexRecord, LanceVectorStore, VectorStore};
use crate::loader::DocumentLoader;

/// 임베딩 배치 크기
const EMBED_BATCH_SIZE: usize = 32;

/// 수집 결과 요약
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_count: usize,
    pub chunk_count: usize,
    /// 인덱스에 저장된 레코드 수
    pub record_count: usize,
    pub index_dir: PathBuf,
    pub embedding_model: String,
    pub elapsed: Duration,
}

/// staging 디렉토리 경로 (`<index_dir>.staging`)
pub fn staging_dir(index_dir: &Path) -> PathBuf {
    sibling_dir(index_dir, "staging")
}

/// 교체 중 기존 인덱스를 보관하는 경로 (`<index_dir>.previous`)
pub fn backup_dir(index_dir: &Path) -> PathBuf {
    sibling_dir(index_dir, "previous")
}

fn sibling_dir(index_dir: &Path, suffix: &str) -> PathBuf {
    let name = index_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    index_dir.with_file_name(format!("{}.{}", name, suffix))
}

/// 수집 실행
///
/// # Arguments
/// * `settings` - 원본/인덱스 경로 및 청킹 설정
/// * `embedder` - 질의 시에도 사용할 임베딩 모델
pub async fn run_ingestion(
    settings: &Settings,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<IngestReport, IngestError> {
    let started = Instant::now();
    settings.validate()?;

    // 1. 문서 로드 (인덱스를 건드리기 전에 확인)
    tracing::info!("Loading documents from {:?}", settings.data_dir);
    let documents = DocumentLoader::new(&settings.data_dir).load().await?;
    if documents.is_empty() {
        return Err(IngestError::NoDocuments {
            path: settings.data_dir.clone(),
        });
    }

    // 2. 청킹
    let chunks = split(&documents, settings.chunk_size, settings.chunk_overlap)?;
    tracing::info!(
        "Split {} documents into {} chunks (size {}, overlap {})",
        documents.len(),
        chunks.len(),
        settings.chunk_size,
        settings.chunk_overlap
    );

    // 3. 임베딩
    let records = embed_chunks(embedder.as_ref(), chunks).await?;
    let chunk_count = records.len();

    // 4. staging 에 쓰고 교체
    let manifest = IndexManifest::new(
        embedder.name(),
        embedder.dimension(),
        settings.chunk_size,
        settings.chunk_overlap,
        documents.len(),
        chunk_count,
    );
    let record_count = write_index(&settings.index_dir, embedder.dimension(), &records, &manifest)
        .await?;

    let report = IngestReport {
        document_count: documents.len(),
        chunk_count,
        record_count,
        index_dir: settings.index_dir.clone(),
        embedding_model: embedder.name().to_string(),
        elapsed: started.elapsed(),
    };
    tracing::info!(
        "Ingestion complete: {} records in {:?} ({:.1}s)",
        report.record_count,
        report.index_dir,
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

/// 청크를 배치 단위로 임베딩
async fn embed_chunks(
    embedder: &dyn EmbeddingProvider,
    chunks: Vec<Chunk>,
) -> Result<Vec<IndexRecord>, IngestError> {
    let total = chunks.len();
    let mut records = Vec::with_capacity(total);

    for (batch_no, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| IngestError::Embedding {
                message: describe(&e),
            })?;

        if embeddings.len() != batch.len() {
            return Err(IngestError::Embedding {
                message: format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                ),
            });
        }

        for (chunk, embedding) in batch.iter().zip(embeddings) {
            if embedding.len() != embedder.dimension() {
                return Err(IngestError::Embedding {
                    message: format!(
                        "embedding for {} #{} has dimension {}, expected {}",
                        chunk.source,
                        chunk.chunk_index,
                        embedding.len(),
                        embedder.dimension()
                    ),
                });
            }
            records.push(IndexRecord {
                source: chunk.source.clone(),
                page: chunk.page,
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                embedding,
            });
        }

        tracing::debug!(
            "Embedded batch {} ({}/{} chunks)",
            batch_no + 1,
            records.len(),
            total
        );
    }

    Ok(records)
}

/// staging 디렉토리에 인덱스를 만든 뒤 대상과 교체
async fn write_index(
    index_dir: &Path,
    dimension: usize,
    records: &[IndexRecord],
    manifest: &IndexManifest,
) -> Result<usize, IngestError> {
    let staging = staging_dir(index_dir);

    if staging.exists() {
        tracing::warn!("Removing stale staging directory {:?}", staging);
        remove_dir(&staging).await?;
    }

    let written = match build_staging(&staging, dimension, records, manifest).await {
        Ok(written) => written,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                tracing::warn!("Failed to clean up {:?}: {}", staging, cleanup);
            }
            return Err(e);
        }
    };

    swap_in(&staging, index_dir).await?;
    Ok(written)
}

/// 완성된 staging 인덱스를 대상 위치로 옮김
///
/// 기존 인덱스는 보관 위치로 먼저 옮기고, 이동이 실패하면 되돌립니다.
async fn swap_in(staging: &Path, index_dir: &Path) -> Result<(), IngestError> {
    let backup = backup_dir(index_dir);
    if backup.exists() {
        tracing::warn!("Removing stale backup directory {:?}", backup);
        remove_dir(&backup).await?;
    }

    let had_index = index_dir.exists();
    if had_index {
        tracing::info!("Replacing existing index at {:?}", index_dir);
        rename_dir(index_dir, &backup).await?;
    }

    if let Err(e) = rename_dir(staging, index_dir).await {
        if had_index {
            if let Err(restore) = tokio::fs::rename(&backup, index_dir).await {
                tracing::error!(
                    "Failed to restore previous index from {:?}: {}",
                    backup,
                    restore
                );
            }
        }
        return Err(e);
    }

    if had_index {
        if let Err(e) = tokio::fs::remove_dir_all(&backup).await {
            tracing::warn!("Failed to remove previous index {:?}: {}", backup, e);
        }
    }
    Ok(())
}

async fn rename_dir(from: &Path, to: &Path) -> Result<(), IngestError> {
    tokio::fs::rename(from, to)
        .await
        .map_err(|e| IngestError::Write {
            message: format!("cannot move {:?} to {:?}: {}", from, to, e),
        })
}

async fn build_staging(
    staging: &Path,
    dimension: usize,
    records: &[IndexRecord],
    manifest: &IndexManifest,
) -> Result<usize, IngestError> {
    let write_err = |e: anyhow::Error| IngestError::Write {
        message: describe(&e),
    };

    let store = LanceVectorStore::create(staging, dimension)
        .await
        .map_err(write_err)?;
    let written = store.write(records).await.map_err(write_err)?;
    let stored = store.count().await.map_err(write_err)?;
    if stored != records.len() {
        return Err(IngestError::Write {
            message: format!("wrote {} records but index holds {}", records.len(), stored),
        });
    }
    manifest.write(staging).await.map_err(write_err)?;

    Ok(written)
}

async fn remove_dir(path: &Path) -> Result<(), IngestError> {
    tokio::fs::remove_dir_all(path)
        .await
        .map_err(|e| IngestError::Write {
            message: format!("cannot remove {:?}: {}", path, e),
        })
}

// ============================================================================
// Tests
// ============================================================================
