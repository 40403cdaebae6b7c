//! 패브릭 에러 타입.

use thiserror::Error;

/// Redis 버스/캐시/락 계층 에러.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("Redis 오류: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 기동 시 Redis 준비 대기 한도 초과
    #[error("Redis 준비 대기 초과: {0}")]
    NotReady(String),

    #[error("도메인 오류: {0}")]
    Domain(#[from] trader_core::DomainError),
}
