//! Text Chunking Module
//!
//! 문서를 고정 크기의 겹치는 문자 창(window)으로 분할합니다.
//!
//! 길이 L 의 문서는 L <= size 이면 1개, 그 외에는
//! ceil((L - overlap) / (size - overlap)) 개의 청크가 되며,
//! 인접 청크는 정확히 `overlap` 문자만큼 겹칩니다.
//! 길이는 바이트가 아닌 문자(char) 단위입니다.

use crate::error::ConfigError;
use crate::loader::Document;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 크기 (문자 수)
    pub size: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 500,
            overlap: 50,
        }
    }
}

impl ChunkConfig {
    /// 검증된 설정 생성 (`0 <= overlap < size`)
    pub fn new(size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if size == 0 || overlap >= size {
            return Err(ConfigError::InvalidChunking { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    /// 창 이동 간격
    fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// 길이 `len` (문자 수) 문서의 청크 개수
    pub fn expected_chunks(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else if len <= self.size {
            1
        } else {
            (len - self.overlap).div_ceil(self.step())
        }
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 문서 청크
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 청크 텍스트
    pub text: String,
    /// 원본 문서 경로
    pub source: String,
    /// 페이지 번호
    pub page: Option<u32>,
    /// 문서 내 순번 (0-based)
    pub chunk_index: u32,
    /// 문서 내 시작 위치 (문자 단위)
    pub offset: usize,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 고정 크기 문자 창 청커
#[derive(Debug, Clone, Default)]
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 설정 반환
    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// (문자 오프셋, 청크 텍스트) 목록
    fn windows<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        // 문자 인덱스 -> 바이트 오프셋 (마지막은 text.len())
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = bounds.len() - 1;

        if len == 0 {
            return vec![];
        }

        let mut windows = Vec::with_capacity(self.config.expected_chunks(len));
        let mut start = 0;

        loop {
            let end = (start + self.config.size).min(len);
            windows.push((start, &text[bounds[start]..bounds[end]]));

            if end >= len {
                break;
            }
            start += self.config.step();
        }

        windows
    }

    /// 문서 하나를 청크로 분할 (메타데이터 유지)
    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        self.windows(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, (offset, text))| Chunk {
                text: text.to_string(),
                source: document.source.clone(),
                page: document.page,
                chunk_index: i as u32,
                offset,
            })
            .collect()
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        self.windows(text)
            .into_iter()
            .map(|(_, t)| t.to_string())
            .collect()
    }

    fn name(&self) -> &'static str {
        "WindowChunker"
    }
}

/// 문서 목록을 순서대로 청크 분할
pub fn split(documents: &[Document], size: usize, overlap: usize) -> Result<Vec<Chunk>, ConfigError> {
    let chunker = WindowChunker::new(ChunkConfig::new(size, overlap)?);
    Ok(documents
        .iter()
        .flat_map(|doc| chunker.split_document(doc))
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
