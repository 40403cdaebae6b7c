//! 상관계수 캐시 — (코드 쌍) → Pearson 계수, TTL 12시간.
//!
//! 계산 자체는 `trader_core::indicators::pearson_log_returns`가 담당하고,
//! 여기서는 일봉 조회 비용을 줄이기 위한 캐싱만 합니다.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use trader_core::StockCode;

use crate::error::FabricError;
use crate::keys;

/// 캐시 TTL (초) — 12시간.
const CORRELATION_TTL_SECS: u64 = 12 * 3_600;

/// 쌍별 상관계수 캐시.
#[derive(Clone)]
pub struct CorrelationCache {
    conn: ConnectionManager,
}

impl CorrelationCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn get(&self, a: &StockCode, b: &StockCode) -> Result<Option<f64>, FabricError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(keys::correlation_pair(a, b)).await?;
        Ok(raw.and_then(|v| v.parse().ok()))
    }

    pub async fn put(
        &self,
        a: &StockCode,
        b: &StockCode,
        correlation: f64,
    ) -> Result<(), FabricError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                keys::correlation_pair(a, b),
                correlation.to_string(),
                CORRELATION_TTL_SECS,
            )
            .await?;
        Ok(())
    }
}
