//! 스트림/캐시 키 네이밍 단일 출처.
//!
//! 키 계약은 서비스 간 공유되므로 여기서만 정의합니다.

use trader_core::StockCode;

// ==================== 스트림 ====================

pub const STREAM_TICKS: &str = "stream:ticks";
pub const STREAM_BUY_SIGNALS: &str = "stream:buy-signals";
pub const STREAM_SELL_ORDERS: &str = "stream:sell-orders";
pub const STREAM_TRADE_RECORDS: &str = "stream:trade-records";
pub const STREAM_DEAD_LETTER: &str = "stream:dead-letter";

pub const GROUP_SCANNER: &str = "group:scanner";
pub const GROUP_MONITOR: &str = "group:monitor";
pub const GROUP_BUY_EXECUTOR: &str = "group:buy-executor";
pub const GROUP_SELL_EXECUTOR: &str = "group:sell-executor";

/// 스트림 공통 MAXLEN (approximate).
pub const STREAM_MAXLEN: usize = 100_000;

// ==================== 캐시 ====================

pub const CACHE_WATCHLIST: &str = "watchlist:active";
pub const CACHE_MANUAL_WATCHLIST: &str = "watchlist:manual";
pub const CACHE_TRADING_CONTEXT: &str = "macro:trading_context";
pub const CACHE_POSITIONS_LIVE: &str = "positions:live";
pub const KEY_EMERGENCY_PAUSE: &str = "emergency:trading_pause";

/// positions:live TTL (초).
pub const POSITIONS_LIVE_TTL_SECS: u64 = 60;

// ==================== 코드별 키 ====================

pub fn buy_lock(code: &StockCode) -> String {
    format!("lock:buy:{}", code)
}

pub fn sell_lock(code: &StockCode) -> String {
    format!("lock:sell:{}", code)
}

pub fn cooldown_sell(code: &StockCode) -> String {
    format!("cooldown:sell:{}", code)
}

pub fn cooldown_stoploss(code: &StockCode) -> String {
    format!("cooldown:stoploss:{}", code)
}

pub fn position_meta(code: &StockCode) -> String {
    format!("position:meta:{}", code)
}

/// 중복 주문 윈도우 마커.
pub fn trade_last(code: &StockCode) -> String {
    format!("trade:last:{}", code)
}

/// 일일 매수 카운터 (KST 날짜).
pub fn daily_buy_count(date: chrono::NaiveDate) -> String {
    format!("buy_count:{}", date.format("%Y-%m-%d"))
}

/// 상관계수 캐시 키 — 코드 쌍을 정렬해 방향 무관.
pub fn correlation_pair(a: &StockCode, b: &StockCode) -> String {
    if a.as_str() <= b.as_str() {
        format!("corr:{}:{}", a, b)
    } else {
        format!("corr:{}:{}", b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_pair_is_order_independent() {
        let a = StockCode::new("005930").unwrap();
        let b = StockCode::new("000660").unwrap();
        assert_eq!(correlation_pair(&a, &b), correlation_pair(&b, &a));
        assert_eq!(correlation_pair(&a, &b), "corr:000660:005930");
    }

    #[test]
    fn per_code_key_shapes() {
        let code = StockCode::new("047040").unwrap();
        assert_eq!(buy_lock(&code), "lock:buy:047040");
        assert_eq!(sell_lock(&code), "lock:sell:047040");
        assert_eq!(cooldown_sell(&code), "cooldown:sell:047040");
        assert_eq!(cooldown_stoploss(&code), "cooldown:stoploss:047040");
    }
}
