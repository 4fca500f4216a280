//! 파일 수집 모듈
//!
//! 인제스트 대상 텍스트 파일을 수집합니다. .gitignore 패턴을 존중하며,
//! UTF-8 텍스트 확장자만 수집합니다. 문서 포맷 파싱(PDF/DOCX)은 범위
//! 밖이며, 추출된 텍스트 파일을 받는 것이 전제입니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

/// 지원하는 텍스트 확장자
const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 크기 (바이트)
    pub size: u64,
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// 텍스트 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 텍스트 파일 여부
    fn is_text_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// 단일 파일 수집 (지원하지 않는 확장자면 None)
    pub fn collect_file(&self, path: &Path) -> Result<Option<CollectedFile>> {
        if !Self::is_text_file(path) {
            return Ok(None);
        }

        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }
        if self.config.max_file_size > 0 && metadata.len() > self.config.max_file_size {
            tracing::warn!(path = %path.display(), size = metadata.len(), "file too large, skipped");
            return Ok(None);
        }

        Ok(Some(CollectedFile {
            path: path.to_path_buf(),
            size: metadata.len(),
        }))
    }

    /// 폴더 재귀 수집
    pub fn collect_directory(&self, dir: &Path) -> Result<Vec<CollectedFile>> {
        let mut files = Vec::new();

        let walker = WalkBuilder::new(dir)
            .git_ignore(self.config.respect_gitignore)
            .hidden(!self.config.include_hidden)
            .build();

        for entry in walker {
            let entry = entry.context("Failed to walk directory")?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                if let Some(file) = self.collect_file(entry.path())? {
                    files.push(file);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_extension_filter() {
        assert!(FileCollector::is_text_file(Path::new("a.md")));
        assert!(FileCollector::is_text_file(Path::new("a.txt")));
        assert!(FileCollector::is_text_file(Path::new("a.MD")));
        assert!(!FileCollector::is_text_file(Path::new("a.pdf")));
        assert!(!FileCollector::is_text_file(Path::new("a.png")));
        assert!(!FileCollector::is_text_file(Path::new("noext")));
    }

    #[test]
    fn test_collect_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("relics.md"), "青铜鼎的介绍").unwrap();
        std::fs::write(dir.path().join("museums.txt"), "大英博物馆").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();

        let collector = FileCollector::with_defaults();
        let files = collector.collect_directory(dir.path()).unwrap();

        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_oversized_file_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "x".repeat(1024)).unwrap();

        let collector = FileCollector::new(CollectorConfig {
            max_file_size: 100,
            ..Default::default()
        });

        assert!(collector.collect_file(&path).unwrap().is_none());
    }
}
