//! Gemini REST 클라이언트 - 임베딩과 생성이 공유
//!
//! 요청 간격 조절, 일시적 실패(429/5xx) 재시도, 에러 본문 해석을 한 곳에서 처리합니다.
//!
//! ref: https://ai.google.dev/api

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Gemini API 베이스 URL
pub(crate) const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// Retry Policy
// ============================================================================

/// 일시적 실패 재시도 정책 (지수 백오프)
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `attempt` 번째 재시도 전 대기 시간
    ///
    /// 서버가 `Retry-After` 로 더 긴 시간을 요구하면 그 값을 따릅니다.
    fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponential = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff);
        retry_after.map_or(exponential, |server| server.max(exponential))
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || matches!(status.as_u16(), 500 | 502 | 503 | 504)
}

// ============================================================================
// Pacing
// ============================================================================

/// 분당 요청 수 한도를 요청 간 고정 간격으로 지키는 예약기
#[derive(Debug)]
struct Pacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    fn per_minute(requests: u32) -> Self {
        Self {
            interval: Duration::from_secs(60) / requests.max(1),
            next_slot: Mutex::new(None),
        }
    }

    /// 다음 빈 슬롯을 예약하고 그 시각을 반환
    async fn reserve(&self) -> Instant {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = next.map_or(now, |reserved| reserved.max(now));
        *next = Some(slot + self.interval);
        slot
    }

    async fn wait_turn(&self) {
        let slot = self.reserve().await;
        if slot > Instant::now() {
            tracing::debug!("Pacing Gemini request for {:?}", slot - Instant::now());
        }
        tokio::time::sleep_until(slot).await;
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// 실패 응답을 읽을 수 있는 메시지로 변환
fn describe_failure(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.error.status.is_empty() => format!(
            "Gemini API error ({}): {}",
            parsed.error.status, parsed.error.message
        ),
        Ok(parsed) => format!("Gemini API error ({}): {}", status, parsed.error.message),
        Err(_) => format!("Gemini API error ({}): {}", status, body.trim()),
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// ============================================================================
// Client
// ============================================================================

/// 모델 메서드(`models/{model}:{method}`) 호출용 클라이언트
#[derive(Debug)]
pub(crate) struct GeminiClient {
    api_key: String,
    http: reqwest::Client,
    pacer: Option<Pacer>,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub(crate) fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            http,
            pacer: None,
            retry: RetryPolicy::default(),
        })
    }

    /// 분당 요청 수 제한
    pub(crate) fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.pacer = Some(Pacer::per_minute(requests_per_minute));
        self
    }

    pub(crate) fn endpoint(model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", API_BASE, model, method)
    }

    /// JSON 요청을 보내고 성공 응답 본문을 반환
    ///
    /// 429 와 5xx, 타임아웃/연결 실패는 재시도하고 나머지 실패는 바로 에러입니다.
    pub(crate) async fn post<B>(&self, model: &str, method: &str, body: &B) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let url = Self::endpoint(model, method);
        let mut attempt = 0;

        loop {
            if let Some(pacer) = &self.pacer {
                pacer.wait_turn().await;
            }

            // API 키는 URL이 아닌 헤더로 전송
            let sent = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await;

            let (failure, server_delay) = match sent {
                Ok(response) => {
                    let status = response.status();
                    let server_delay = retry_after(&response);
                    let text = response
                        .text()
                        .await
                        .context("Failed to read response body")?;

                    if status.is_success() {
                        return Ok(text);
                    }
                    if !is_transient(status) {
                        anyhow::bail!(describe_failure(status, &text));
                    }
                    (describe_failure(status, &text), server_delay)
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    (format!("{} request failed: {}", method, e), None)
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to send {} request", method))
                }
            };

            if attempt >= self.retry.max_retries {
                anyhow::bail!("{} (gave up after {} retries)", failure, attempt);
            }

            let delay = self.retry.delay(attempt, server_delay);
            attempt += 1;
            tracing::warn!(
                "{}, retrying in {:?} ({}/{})",
                failure,
                delay,
                attempt,
                self.retry.max_retries
            );
            tokio::time::sleep(delay).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
