//! 분산 락, 쿨다운, 일일 카운터, 비상 정지 플래그.
//!
//! 락 프로토콜은 단일 SETNX+TTL이 전부입니다. 갱신도 펜싱도 없음 —
//! 코드별 작업은 10초 미만으로 끝나고, TTL 초과 시 다른 워커의 획득은
//! 정당하며 증권사 자체가 1분 내 중복 주문을 거부합니다.

use chrono::NaiveDate;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use trader_core::StockCode;

use crate::error::FabricError;
use crate::keys;

/// SETNX+TTL 분산 락.
#[derive(Clone)]
pub struct DistributedLock {
    conn: ConnectionManager,
}

impl DistributedLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// 락 획득 시도. 이미 잡혀 있으면 false.
    pub async fn acquire(&self, key: &str, ttl_secs: u64) -> Result<bool, FabricError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    /// 락 해제.
    pub async fn release(&self, key: &str) -> Result<(), FabricError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}

/// 재진입 쿨다운 — TTL 키 존재 ⇒ 쿨다운 활성.
#[derive(Clone)]
pub struct Cooldowns {
    conn: ConnectionManager,
}

impl Cooldowns {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// 모든 매도 후 24시간 쿨다운.
    pub async fn set_sell_cooldown(
        &self,
        code: &StockCode,
        hours: u32,
    ) -> Result<(), FabricError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(keys::cooldown_sell(code), "1", u64::from(hours) * 3_600)
            .await?;
        debug!(stock_code = %code, hours, "매도 쿨다운 설정");
        Ok(())
    }

    /// 손절성 매도 후 3일 쿨다운.
    pub async fn set_stoploss_cooldown(
        &self,
        code: &StockCode,
        days: u32,
    ) -> Result<(), FabricError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(keys::cooldown_stoploss(code), "1", u64::from(days) * 86_400)
            .await?;
        info!(stock_code = %code, days, "손절 쿨다운 설정");
        Ok(())
    }

    pub async fn is_sell_cooldown(&self, code: &StockCode) -> Result<bool, FabricError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(keys::cooldown_sell(code)).await?;
        Ok(exists)
    }

    pub async fn is_stoploss_cooldown(&self, code: &StockCode) -> Result<bool, FabricError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(keys::cooldown_stoploss(code)).await?;
        Ok(exists)
    }
}

/// 일일 매수 카운터 — `buy_count:{date}` INCR + 24h 만료.
#[derive(Clone)]
pub struct DailyBuyCounter {
    conn: ConnectionManager,
}

impl DailyBuyCounter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn count(&self, date: NaiveDate) -> Result<u32, FabricError> {
        let mut conn = self.conn.clone();
        let count: Option<u32> = conn.get(keys::daily_buy_count(date)).await?;
        Ok(count.unwrap_or(0))
    }

    pub async fn increment(&self, date: NaiveDate) -> Result<(), FabricError> {
        let key = keys::daily_buy_count(date);
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .ignore()
            .expire(&key, 86_400)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// 중복 주문 윈도우 마커 — 최근 체결 후 일정 시간 재주문 차단.
#[derive(Clone)]
pub struct TradeMarkers {
    conn: ConnectionManager,
}

impl TradeMarkers {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn mark(&self, code: &StockCode, ttl_secs: u64) -> Result<(), FabricError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(keys::trade_last(code), "1", ttl_secs).await?;
        Ok(())
    }

    pub async fn recently_traded(&self, code: &StockCode) -> Result<bool, FabricError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(keys::trade_last(code)).await?;
        Ok(exists)
    }
}

/// 비상 정지 플래그 조회.
pub async fn is_emergency_paused(conn: &ConnectionManager) -> Result<bool, FabricError> {
    let mut conn = conn.clone();
    let exists: bool = conn.exists(keys::KEY_EMERGENCY_PAUSE).await?;
    Ok(exists)
}
