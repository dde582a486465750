//! 설정 모듈 - 환경변수 기반 설정 로드
//!
//! `.env` 파일(있으면)과 환경변수에서 설정을 읽습니다.
//! API 키는 별도로 조회하여, 로컬 임베딩만 쓰는 수집(ingest)은 키 없이도 동작합니다.

use std::path::PathBuf;
use std::str::FromStr;

use crate::embedding::DevicePreference;
use crate::error::ConfigError;

// ============================================================================
// Defaults
// ============================================================================

/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
/// 기본 생성 모델
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_RETRIEVAL_K: usize = 5;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
/// 벡터 인덱스 디렉토리 (작업 디렉토리 기준)
pub const DEFAULT_INDEX_DIR: &str = "vector_db";
/// 원본 문서 디렉토리 (작업 디렉토리 기준)
pub const DEFAULT_DATA_DIR: &str = "data";

/// API 키 환경변수 (우선순위 순)
const API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

// ============================================================================
// Settings
// ============================================================================

/// 프로세스 설정
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// 임베딩 모델 ID (수집/질의 공통)
    pub embedding_model: String,
    /// 임베딩 출력 차원 (Gemini 만 선택 가능, 없으면 모델 기본값)
    pub embedding_dimension: Option<usize>,
    /// 생성 모델 ID
    pub llm_model: String,
    /// 생성 온도
    pub temperature: f32,
    /// 검색 결과 수 (top-K)
    pub retrieval_k: usize,
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 벡터 인덱스 디렉토리
    pub index_dir: PathBuf,
    /// 원본 문서 디렉토리
    pub data_dir: PathBuf,
    /// 임베딩 디바이스 선호
    pub device: DevicePreference,
    /// 프롬프트 템플릿 파일 (없으면 내장 템플릿)
    pub prompt_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            device: DevicePreference::Auto,
            prompt_file: None,
        }
    }
}

impl Settings {
    /// 환경변수에서 설정 로드 (`.env` 포함)
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 로드
    ///
    /// 테스트에서 프로세스 환경변수를 건드리지 않기 위해 분리되어 있습니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let settings = Self {
            embedding_model: get("NEURORAG_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_opt(&get, "NEURORAG_EMBEDDING_DIMENSION")?,
            llm_model: get("NEURORAG_LLM_MODEL").unwrap_or(defaults.llm_model),
            temperature: parse_or(&get, "NEURORAG_TEMPERATURE", defaults.temperature)?,
            retrieval_k: parse_or(&get, "NEURORAG_RETRIEVAL_K", defaults.retrieval_k)?,
            chunk_size: parse_or(&get, "NEURORAG_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_or(&get, "NEURORAG_CHUNK_OVERLAP", defaults.chunk_overlap)?,
            index_dir: get("NEURORAG_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            data_dir: get("NEURORAG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            device: parse_or(&get, "NEURORAG_DEVICE", defaults.device)?,
            prompt_file: get("NEURORAG_PROMPT_FILE").map(PathBuf::from),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NEURORAG_CHUNK_SIZE",
                value: self.chunk_size.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        if self.retrieval_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NEURORAG_RETRIEVAL_K",
                value: self.retrieval_k.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "NEURORAG_TEMPERATURE",
                value: self.temperature.to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }
        Ok(())
    }

    /// 생성 모델용 API 키 (질의 시작 시 필수)
    pub fn require_api_key(&self) -> Result<String, ConfigError> {
        get_api_key()
    }
}

/// 환경변수 값 파싱 (없으면 기본값)
fn parse_or<T>(
    get: &dyn Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

fn parse_opt<T>(
    get: &dyn Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue {
                    key,
                    value: value.clone(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GOOGLE_API_KEY`
/// 2. `GEMINI_API_KEY`
pub fn get_api_key() -> Result<String, ConfigError> {
    api_key_from(|key| std::env::var(key).ok())
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

fn api_key_from<F>(lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for var in API_KEY_VARS {
        if let Some(key) = lookup(var).filter(|k| !k.trim().is_empty()) {
            tracing::debug!("Using API key from {}", var);
            return Ok(key);
        }
    }
    Err(ConfigError::MissingCredential)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.chunk_size, 500);
        assert_eq!(settings.chunk_overlap, 50);
        assert_eq!(settings.retrieval_k, 5);
        assert!((settings.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.index_dir, PathBuf::from("vector_db"));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("NEURORAG_RETRIEVAL_K", "8"),
            ("NEURORAG_CHUNK_SIZE", "800"),
            ("NEURORAG_CHUNK_OVERLAP", "100"),
            ("NEURORAG_INDEX_DIR", "/tmp/idx"),
            ("NEURORAG_DEVICE", "cpu"),
            ("NEURORAG_LLM_MODEL", "gemini-2.5-flash"),
            ("NEURORAG_EMBEDDING_DIMENSION", "1536"),
        ]))
        .unwrap();
        assert_eq!(settings.embedding_dimension, Some(1536));
        assert_eq!(settings.retrieval_k, 8);
        assert_eq!(settings.chunk_size, 800);
        assert_eq!(settings.chunk_overlap, 100);
        assert_eq!(settings.index_dir, PathBuf::from("/tmp/idx"));
        assert_eq!(settings.device, DevicePreference::Cpu);
        assert_eq!(settings.llm_model, "gemini-2.5-flash");
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let settings =
            Settings::from_lookup(lookup_from(&[("NEURORAG_RETRIEVAL_K", "  ")])).unwrap();
        assert_eq!(settings.retrieval_k, DEFAULT_RETRIEVAL_K);
    }

    #[test]
    fn test_invalid_number_is_reported_with_key() {
        let err = Settings::from_lookup(lookup_from(&[("NEURORAG_RETRIEVAL_K", "five")]))
            .unwrap_err();
        assert!(err.to_string().contains("NEURORAG_RETRIEVAL_K"));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = Settings::from_lookup(lookup_from(&[
            ("NEURORAG_CHUNK_SIZE", "100"),
            ("NEURORAG_CHUNK_OVERLAP", "100"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidChunking {
                size: 100,
                overlap: 100
            }
        ));
    }

    #[test]
    fn test_zero_k_rejected() {
        let err =
            Settings::from_lookup(lookup_from(&[("NEURORAG_RETRIEVAL_K", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_negative_temperature_rejected() {
        let mut settings = Settings::default();
        settings.temperature = -0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_api_key_priority() {
        let key = api_key_from(lookup_from(&[
            ("GOOGLE_API_KEY", "google"),
            ("GEMINI_API_KEY", "gemini"),
        ]))
        .unwrap();
        assert_eq!(key, "google");

        let key = api_key_from(lookup_from(&[("GEMINI_API_KEY", "gemini")])).unwrap();
        assert_eq!(key, "gemini");
    }

    #[test]
    fn test_missing_api_key() {
        let err = api_key_from(lookup_from(&[("GOOGLE_API_KEY", "")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential));
    }
}
