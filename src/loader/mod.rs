//! 문서 로더 - 원본 디렉토리에서 Document 목록 생성
//!
//! 디렉토리를 재귀적으로 순회하여 지원 확장자의 파일을 읽습니다.
//! - PDF: 페이지마다 Document 하나 (1-based 페이지 번호)
//! - 텍스트(.txt, .md): 파일마다 Document 하나 (페이지 없음)
//!
//! 하나라도 읽기에 실패하면 전체 로드가 실패합니다.

mod pdf;

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::IngestError;

// ============================================================================
// Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 일반 텍스트 / 마크다운
    Text,
    /// PDF
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" | "markdown" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// 로드된 문서 (또는 PDF 한 페이지)
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// 원본 파일 경로
    pub source: String,
    /// 페이지 번호 (PDF 만)
    pub page: Option<u32>,
    /// 원문 텍스트
    pub text: String,
}

// ============================================================================
// DocumentLoader
// ============================================================================

/// 디렉토리 문서 로더
pub struct DocumentLoader {
    root: PathBuf,
}

impl DocumentLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 지원 파일 목록 (경로순 정렬)
    pub fn collect_files(&self) -> Result<Vec<(PathBuf, FileType)>, IngestError> {
        if !self.root.is_dir() {
            return Err(IngestError::SourceMissing {
                path: self.root.clone(),
            });
        }

        // 숨김 파일은 건너뛰고, .gitignore 는 적용하지 않음 (원본 폴더 자체가 ignore 대상일 수 있음)
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .parents(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| IngestError::Load {
                path: self.root.clone(),
                message: e.to_string(),
            })?;

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.into_path();
            match FileType::from_path(&path) {
                Some(file_type) => files.push((path, file_type)),
                None => tracing::debug!("Skipping unsupported file: {:?}", path),
            }
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// 모든 문서 로드
    ///
    /// 텍스트가 비어 있는 문서는 경고 후 제외합니다.
    pub async fn load(&self) -> Result<Vec<Document>, IngestError> {
        let files = self.collect_files()?;
        tracing::info!("Found {} supported files in {:?}", files.len(), self.root);

        let mut documents = Vec::new();
        for (path, file_type) in files {
            let loaded = match file_type {
                FileType::Text => load_text(&path).await?,
                FileType::Pdf => load_pdf(&path).await?,
            };

            for document in loaded {
                if document.text.trim().is_empty() {
                    tracing::warn!("Skipping blank document: {}", document.source);
                    continue;
                }
                documents.push(document);
            }
        }

        tracing::info!("Loaded {} documents", documents.len());
        Ok(documents)
    }
}

async fn load_text(path: &Path) -> Result<Vec<Document>, IngestError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| IngestError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(vec![Document {
        source: path.display().to_string(),
        page: None,
        text,
    }])
}

async fn load_pdf(path: &Path) -> Result<Vec<Document>, IngestError> {
    let owned = path.to_path_buf();
    // pdf-extract 는 블로킹이며, 손상된 파일에서 panic 할 수 있음
    let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&owned))
        .await
        .map_err(|e| IngestError::Load {
            path: path.to_path_buf(),
            message: format!("PDF extraction aborted: {}", e),
        })?
        .map_err(|e| IngestError::Load {
            path: path.to_path_buf(),
            message: format!("{:#}", e),
        })?;

    tracing::debug!("Extracted {} pages from {:?}", pages.len(), path);

    let source = path.display().to_string();
    Ok(pages
        .into_iter()
        .map(|(page, text)| Document {
            source: source.clone(),
            page: Some(page as u32),
            text,
        })
        .collect())
}

/// 디렉토리의 모든 문서 로드
pub async fn load_documents(root: &Path) -> Result<Vec<Document>, IngestError> {
    DocumentLoader::new(root).load().await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("md"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("txt"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("png"), None);
    }

    #[tokio::test]
    async fn test_missing_source_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let err = load_documents(&missing).await.unwrap_err();
        assert!(matches!(err, IngestError::SourceMissing { .. }));
    }

    #[tokio::test]
    async fn test_load_text_files_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("b.txt"), "second").unwrap();
        std::fs::write(root.join("a.md"), "# first").unwrap();
        std::fs::write(root.join("sub").join("c.txt"), "third").unwrap();
        std::fs::write(root.join("blank.txt"), "  \n ").unwrap();
        std::fs::write(root.join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(root.join(".hidden.txt"), "hidden").unwrap();

        let documents = load_documents(root).await.unwrap();
        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["# first", "second", "third"]);
        assert!(documents.iter().all(|d| d.page.is_none()));
        assert!(documents[0].source.ends_with("a.md"));
    }

    #[tokio::test]
    async fn test_empty_directory_yields_no_documents() {
        let temp_dir = TempDir::new().unwrap();
        let documents = load_documents(temp_dir.path()).await.unwrap();
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_pdf_aborts_load() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("ok.txt"), "fine").unwrap();
        std::fs::write(temp_dir.path().join("broken.pdf"), b"this is not a pdf").unwrap();

        let err = load_documents(temp_dir.path()).await.unwrap_err();
        match err {
            IngestError::Load { path, .. } => assert!(path.ends_with("broken.pdf")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_text_aborts_load() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("bad.txt"), [0xff, 0xfe, 0xfd]).unwrap();
        let err = load_documents(temp_dir.path()).await.unwrap_err();
        assert!(matches!(err, IngestError::Load { .. }));
    }
}
