//! 포지션 로컬 메타데이터 저장소.
//!
//! 수량/평단의 진실은 증권사 잔고이고, 여기에는 잔고가 모르는 로컬
//! 상태만 저장합니다: 고점(high watermark), 손절선, 섹터, 매수 시각,
//! 스케일아웃 커서, RSI 부분매도 플래그.
//!
//! 쓰기 주체: 생성 = 매수 실행기, 고점/커서 갱신 = 모니터,
//! 삭제 = 매도 실행기(전량 청산 시).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use trader_core::{PositionMeta, StockCode};

use crate::error::FabricError;
use crate::keys;

/// `position:meta:{code}` 저장소.
#[derive(Clone)]
pub struct PositionStore {
    conn: ConnectionManager,
}

impl PositionStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn get(&self, code: &StockCode) -> Result<Option<PositionMeta>, FabricError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(keys::position_meta(code)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(stock_code = %code, error = %e, "포지션 메타 파싱 실패");
                Ok(None)
            }
        }
    }

    pub async fn put(&self, meta: &PositionMeta) -> Result<(), FabricError> {
        let data = serde_json::to_string(meta)?;
        let mut conn = self.conn.clone();
        // 보유 기간 상한(30일)을 넉넉히 넘는 TTL — 고아 메타 자연 소멸
        let _: () = conn
            .set_ex(keys::position_meta(&meta.stock_code), data, 60 * 86_400)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, code: &StockCode) -> Result<(), FabricError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(keys::position_meta(code)).await?;
        Ok(())
    }
}
