//! LanceDB Vector Store - 청크 인덱스 영속화 및 코사인 검색
//!
//! 인덱스 디렉토리 하나에 `chunks` 테이블 하나를 둡니다.
//! 임베딩 차원은 인덱스 생성 시 정해지며 스키마에 기록됩니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{
    score_from_distance, sort_by_score, IndexRecord, SearchResult, VectorStore,
};

/// 청크 테이블 이름
pub const TABLE_NAME: &str = "chunks";

/// 임베딩 컬럼 이름
const EMBEDDING_COLUMN: &str = "embedding";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소
pub struct LanceVectorStore {
    db: Connection,
    path: PathBuf,
    dimension: usize,
}

impl LanceVectorStore {
    /// 새 인덱스 생성 (쓰기용)
    ///
    /// # Arguments
    /// * `path` - 인덱스 디렉토리
    /// * `dimension` - 임베딩 차원
    pub async fn create(path: &Path, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be positive");
        }

        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create index directory {}", path.display()))?;

        let db = connect(path).await?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
            dimension,
        })
    }

    /// 기존 인덱스 열기 (읽기용)
    ///
    /// `chunks` 테이블이 없으면 `None` 을 반환합니다.
    pub async fn open(path: &Path) -> Result<Option<Self>> {
        let db = connect(path).await?;

        let names = db
            .table_names()
            .execute()
            .await
            .context("Failed to list index tables")?;
        if !names.iter().any(|name| name == TABLE_NAME) {
            return Ok(None);
        }

        let table = db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open chunks table")?;
        let schema = table.schema().await.context("Failed to read index schema")?;
        let dimension = schema
            .field_with_name(EMBEDDING_COLUMN)
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| anyhow::anyhow!("Index schema has no fixed-size embedding column"))?;

        Ok(Some(Self {
            db,
            path: path.to_path_buf(),
            dimension,
        }))
    }

    /// 인덱스 디렉토리
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 임베딩 차원
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 테이블 스키마
    fn schema(&self) -> Result<Schema> {
        let size = i32::try_from(self.dimension).context("Embedding dimension too large")?;
        Ok(Schema::new(vec![
            Field::new("source", DataType::Utf8, false),
            Field::new("page", DataType::Int32, true),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                EMBEDDING_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    size,
                ),
                false,
            ),
        ]))
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(&self, records: &[IndexRecord]) -> Result<RecordBatch> {
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != self.dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch for {} #{}: expected {}, got {}",
                bad.source,
                bad.chunk_index,
                self.dimension,
                bad.embedding.len()
            );
        }

        let schema = Arc::new(self.schema()?);
        let size = i32::try_from(self.dimension).context("Embedding dimension too large")?;

        let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
        let pages: Vec<Option<i32>> = records
            .iter()
            .map(|r| r.page.map(|p| p as i32))
            .collect();
        let chunk_indices: Vec<i32> = records.iter().map(|r| r.chunk_index as i32).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();

        let values: Vec<f32> = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();
        let embeddings = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            size,
            Arc::new(Float32Array::from(values)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(sources)),
                Arc::new(Int32Array::from(pages)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list index tables")?;
        Ok(names.iter().any(|name| name == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open chunks table")
    }
}

async fn connect(path: &Path) -> Result<Connection> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path encoding: {}", path.display()))?;

    lancedb::connect(path_str)
        .execute()
        .await
        .with_context(|| format!("Failed to connect to LanceDB at {}", path.display()))
}

/// 검색 결과 배치에서 SearchResult 추출
fn batch_to_results(batch: &RecordBatch, out: &mut Vec<SearchResult>) -> Result<()> {
    let sources = batch
        .column_by_name("source")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing source column"))?;
    let pages = batch
        .column_by_name("page")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing page column"))?;
    let chunk_indices = batch
        .column_by_name("chunk_index")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;
    let texts = batch
        .column_by_name("text")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing text column"))?;
    // _distance 컬럼 (LanceDB가 자동 추가, 코사인 거리)
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

    for i in 0..batch.num_rows() {
        out.push(SearchResult {
            source: sources.value(i).to_string(),
            page: if pages.is_null(i) {
                None
            } else {
                Some(pages.value(i) as u32)
            },
            chunk_index: chunk_indices.value(i) as u32,
            text: texts.value(i).to_string(),
            score: score_from_distance(distances.value(i)),
        });
    }

    Ok(())
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn write(&self, records: &[IndexRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await? {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add records to chunks table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create chunks table")?;
        }

        tracing::debug!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(records.len())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }
        if embedding.len() != self.dimension {
            anyhow::bail!(
                "Query embedding has dimension {}, index expects {}",
                embedding.len(),
                self.dimension
            );
        }

        let stream = self
            .open_table()
            .await?
            .vector_search(embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to read search results")?;

        let mut results = Vec::with_capacity(k);
        for batch in &batches {
            batch_to_results(batch, &mut results)?;
        }

        sort_by_score(&mut results);
        results.truncate(k);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn record(source: &str, chunk_index: u32, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            source: source.to_string(),
            page: Some(1),
            chunk_index,
            text: format!("chunk {} of {}", chunk_index, source),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index");

        let store = LanceVectorStore::create(&path, DIM).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        let records = vec![
            record("a.txt", 0, vec![1.0, 0.0, 0.0, 0.0]),
            record("a.txt", 1, vec![0.0, 1.0, 0.0, 0.0]),
        ];
        assert_eq!(store.write(&records).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        // 추가 쓰기는 append
        let more = vec![record("b.txt", 0, vec![0.0, 0.0, 1.0, 0.0])];
        store.write(&more).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_lance_query_orders_by_cosine_similarity() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index");
        let store = LanceVectorStore::create(&path, DIM).await.unwrap();

        let records = vec![
            record("far.txt", 0, vec![0.0, 0.0, 0.0, 1.0]),
            record("near.txt", 0, vec![0.9, 0.1, 0.0, 0.0]),
            record("mid.txt", 0, vec![0.5, 0.5, 0.0, 0.0]),
        ];
        store.write(&records).await.unwrap();

        let results = store.query(&[1.0, 0.0, 0.0, 0.0], 3).await.unwrap();
        let sources: Vec<&str> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["near.txt", "mid.txt", "far.txt"]);
        assert!(results[0].score > results[1].score);
        assert!(results[1].score > results[2].score);
        assert!(results[0].score <= 1.0 + 1e-5);
    }

    #[tokio::test]
    async fn test_lance_query_k_bounds() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index");
        let store = LanceVectorStore::create(&path, DIM).await.unwrap();

        let records = vec![
            record("a.txt", 0, vec![1.0, 0.0, 0.0, 0.0]),
            record("b.txt", 0, vec![0.0, 1.0, 0.0, 0.0]),
        ];
        store.write(&records).await.unwrap();

        let query = [1.0, 1.0, 0.0, 0.0];
        assert!(store.query(&query, 0).await.unwrap().is_empty());
        assert_eq!(store.query(&query, 1).await.unwrap().len(), 1);
        assert_eq!(store.query(&query, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lance_query_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::create(&temp_dir.path().join("index"), DIM)
            .await
            .unwrap();
        assert!(store.query(&[1.0, 0.0, 0.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lance_rejects_dimension_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::create(&temp_dir.path().join("index"), DIM)
            .await
            .unwrap();

        let err = store
            .write(&[record("a.txt", 0, vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_lance_reopen_reads_dimension_and_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index");

        {
            let store = LanceVectorStore::create(&path, DIM).await.unwrap();
            let mut no_page = record("notes.md", 2, vec![0.0, 1.0, 0.0, 0.0]);
            no_page.page = None;
            store.write(&[no_page]).await.unwrap();
        }

        let store = LanceVectorStore::open(&path).await.unwrap().unwrap();
        assert_eq!(store.dimension(), DIM);
        assert_eq!(store.count().await.unwrap(), 1);

        let results = store.query(&[0.0, 1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].source, "notes.md");
        assert_eq!(results[0].page, None);
        assert_eq!(results[0].chunk_index, 2);
        assert_eq!(results[0].text, "chunk 2 of notes.md");
    }

    #[tokio::test]
    async fn test_lance_open_without_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index");
        LanceVectorStore::create(&path, DIM).await.unwrap();

        assert!(LanceVectorStore::open(&path).await.unwrap().is_none());
    }
}
