//! Gateway 에러 분류.
//!
//! 업무 오류(잔고 부족, 호가 단위 위반 등)와 전송 오류(타임아웃, 5xx)를
//! 구분합니다. 전송 오류만 서킷 브레이커 실패로 집계됩니다.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// 토큰 버킷 고갈 (2초 내 토큰 획득 실패)
    #[error("RATE_LIMITED")]
    RateLimited,

    /// 서킷 브레이커 OPEN — 빠른 거부
    #[error("CIRCUIT_OPEN: {endpoint}")]
    CircuitOpen { endpoint: String },

    /// 업스트림 전송 오류 (타임아웃, 5xx, 연결 실패)
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),

    /// KIS 업무 오류 — 그대로 전달, 브레이커에 집계하지 않음
    #[error("KIS 업무 오류 [{code}]: {message}")]
    Business { code: String, message: String },

    /// 요청 검증 실패
    #[error("검증 오류: {0}")]
    Validation(String),

    /// 토큰/승인키 발급 실패
    #[error("인증 오류: {0}")]
    Auth(String),

    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// 브레이커 실패로 집계할 전송 오류인지.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Auth(_))
    }

    /// HTTP 응답 상태 코드.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Business { .. } => 400,
            Self::RateLimited => 429,
            Self::CircuitOpen { .. } => 503,
            Self::Upstream(_) => 503,
            Self::Auth(_) | Self::Serialization(_) => 500,
        }
    }

    /// 에러 코드 문자열 (응답 `error` 필드).
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Business { .. } => "KIS_ERROR",
            Self::Validation(_) => "VALIDATION",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Serialization(_) => "INTERNAL",
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}
