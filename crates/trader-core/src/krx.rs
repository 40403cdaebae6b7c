//! KRX 시장 규칙 — 호가 단위, 장 세션.

use chrono::{NaiveTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// 장 세션 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSession {
    PreMarket,
    PreOpening,
    Regular,
    Closing,
    AfterHours,
}

impl MarketSession {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreMarket => "pre_market",
            Self::PreOpening => "pre_opening",
            Self::Regular => "regular",
            Self::Closing => "closing",
            Self::AfterHours => "after_hours",
        }
    }

    /// 주문 제출이 가능한 세션인지.
    pub fn is_open(self) -> bool {
        matches!(self, Self::PreOpening | Self::Regular | Self::Closing)
    }
}

/// KST 시각 → 세션 판정.
pub fn session_at(time: NaiveTime) -> MarketSession {
    let hm = time.hour() * 100 + time.minute();
    match hm {
        _ if hm < 900 => MarketSession::PreMarket,
        _ if hm < 930 => MarketSession::PreOpening,
        _ if hm < 1530 => MarketSession::Regular,
        _ if hm < 1600 => MarketSession::Closing,
        _ => MarketSession::AfterHours,
    }
}

/// KRX 호가 단위 (2023 개편 기준).
///
/// 2,000 미만 1원 / 5,000 미만 5원 / 20,000 미만 10원 / 50,000 미만 50원 /
/// 200,000 미만 100원 / 500,000 미만 500원 / 이상 1,000원.
pub fn tick_size(price: i64) -> i64 {
    match price {
        p if p < 2_000 => 1,
        p if p < 5_000 => 5,
        p if p < 20_000 => 10,
        p if p < 50_000 => 50,
        p if p < 200_000 => 100,
        p if p < 500_000 => 500,
        _ => 1_000,
    }
}

/// 가격을 호가 단위로 내림 정렬.
pub fn align_to_tick(price: Decimal) -> Decimal {
    let won = price.trunc().to_i64().unwrap_or(0).max(0);
    let tick = tick_size(won);
    Decimal::from((won / tick) * tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tick_size_table() {
        assert_eq!(tick_size(1_999), 1);
        assert_eq!(tick_size(2_000), 5);
        assert_eq!(tick_size(4_999), 5);
        assert_eq!(tick_size(5_000), 10);
        assert_eq!(tick_size(19_990), 10);
        assert_eq!(tick_size(20_000), 50);
        assert_eq!(tick_size(72_100), 100);
        assert_eq!(tick_size(500_000), 1_000);
    }

    #[test]
    fn align_rounds_down() {
        assert_eq!(align_to_tick(dec!(72316.3)), dec!(72300));
        assert_eq!(align_to_tick(dec!(4998)), dec!(4995));
        assert_eq!(align_to_tick(dec!(1999)), dec!(1999));
        assert_eq!(align_to_tick(dec!(523456)), dec!(523000));
    }

    #[test]
    fn session_boundaries() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(session_at(t(8, 59)), MarketSession::PreMarket);
        assert_eq!(session_at(t(9, 0)), MarketSession::PreOpening);
        assert_eq!(session_at(t(9, 30)), MarketSession::Regular);
        assert_eq!(session_at(t(15, 29)), MarketSession::Regular);
        assert_eq!(session_at(t(15, 30)), MarketSession::Closing);
        assert_eq!(session_at(t(16, 0)), MarketSession::AfterHours);
        assert!(session_at(t(10, 0)).is_open());
        assert!(!session_at(t(16, 30)).is_open());
    }
}
