//! PDF 텍스트 추출
//!
//! pdf-extract 로 전체 텍스트를 뽑은 뒤 페이지 단위로 나눕니다.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

/// PDF 페이지별 텍스트 추출
///
/// (페이지 번호, 텍스트) 목록을 반환합니다. 페이지 번호는 1부터 시작하며,
/// 텍스트가 없는 페이지는 결과에서 빠집니다 (번호는 유지).
pub fn extract_pages(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pages(&text)?
        .into_iter()
        .enumerate()
        .map(|(i, page)| (i + 1, page.trim().to_string()))
        .filter(|(_, page)| !page.is_empty())
        .collect())
}

/// 추출된 텍스트를 페이지로 분리
///
/// 폼피드(`\x0c`) 우선, 없으면 `--- Page N ---` 형태의 구분선, 둘 다 없으면 통째로 1페이지.
fn split_pages(text: &str) -> Result<Vec<&str>> {
    let pages: Vec<&str> = text.split('\x0c').collect();
    if pages.len() > 1 {
        return Ok(pages);
    }

    let separator = Regex::new(r"(?m)^\s*[-=]+\s*(?:Page\s*)?\d+\s*[-=]+\s*$")
        .context("Invalid page separator pattern")?;
    if separator.is_match(text) {
        let pages: Vec<&str> = separator
            .split(text)
            .filter(|page| !page.trim().is_empty())
            .collect();
        if pages.len() > 1 {
            return Ok(pages);
        }
    }

    Ok(vec![text])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_with_formfeed() {
        let pages = split_pages("Page one\x0cPage two\x0cPage three").unwrap();
        assert_eq!(pages, vec!["Page one", "Page two", "Page three"]);
    }

    #[test]
    fn test_split_pages_with_separator_lines() {
        let text = "intro text\n--- Page 2 ---\nsecond page\n--- Page 3 ---\nthird page";
        let pages = split_pages(text).unwrap();
        assert_eq!(pages.len(), 3);
        assert!(pages[1].contains("second page"));
    }

    #[test]
    fn test_split_pages_no_separator() {
        let pages = split_pages("Just some text without page breaks").unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_extract_pages_missing_file() {
        let err = extract_pages(Path::new("/nonexistent/file.pdf")).unwrap_err();
        assert!(err.to_string().contains("Failed to read PDF"));
    }
}
