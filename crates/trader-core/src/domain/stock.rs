//! 종목 식별자와 시세 레코드.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// 6자리 숫자 종목코드.
///
/// 모든 경계에서 검증됩니다. `"005930"` 같은 KRX 표준 코드만 허용.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StockCode(String);

impl StockCode {
    /// 검증 후 생성. 6자리 ASCII 숫자가 아니면 거부.
    pub fn new(code: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into();
        if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(code))
        } else {
            Err(DomainError::InvalidStockCode(code))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StockCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StockCode> for String {
    fn from(code: StockCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for StockCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for StockCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 현재가 스냅샷 (Gateway → 호출자).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub stock_code: StockCode,
    pub price: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: i64,
    pub change_pct: f64,
    #[serde(default)]
    pub per: Option<f64>,
    #[serde(default)]
    pub pbr: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// 일봉.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPrice {
    pub stock_code: StockCode,
    pub price_date: NaiveDate,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,
    pub volume: i64,
    #[serde(default)]
    pub change_pct: Option<f64>,
}

/// 분봉 (Gateway REST 조회 결과).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinutePrice {
    pub stock_code: StockCode,
    pub price_datetime: NaiveDateTime,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,
    pub volume: i64,
}

/// 실시간 체결 틱 (Gateway WS → stream:ticks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub stock_code: StockCode,
    pub price: Decimal,
    pub volume: i64,
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    /// 경계 재검증 — 가격 양수, 거래량 음수 불가.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.price <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "틱 가격이 양수가 아님: {} {}",
                self.stock_code, self.price
            )));
        }
        if self.volume < 0 {
            return Err(DomainError::InvariantViolation(format!(
                "틱 거래량이 음수: {} {}",
                self.stock_code, self.volume
            )));
        }
        Ok(())
    }
}

/// 스캐너가 틱에서 파생하는 1분봉.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteBar {
    /// 분 단위로 절삭된 epoch 초
    pub minute_ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn stock_code_validation() {
        assert!(StockCode::new("005930").is_ok());
        assert!(StockCode::new("000660").is_ok());
        assert!(StockCode::new("05930").is_err()); // 5자리
        assert!(StockCode::new("0059301").is_err()); // 7자리
        assert!(StockCode::new("00593a").is_err()); // 숫자 아님
        assert!(StockCode::new("").is_err());
    }

    #[test]
    fn stock_code_serde_roundtrip() {
        let code = StockCode::new("005930").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"005930\"");
        let back: StockCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn stock_code_deser_rejects_invalid() {
        let result: Result<StockCode, _> = serde_json::from_str("\"ABC123\"");
        assert!(result.is_err());
    }

    #[test]
    fn tick_validation() {
        let tick = PriceTick {
            stock_code: StockCode::new("005930").unwrap(),
            price: dec!(72100),
            volume: 100,
            timestamp: Utc::now(),
        };
        assert!(tick.validate().is_ok());

        let bad = PriceTick {
            price: Decimal::ZERO,
            ..tick.clone()
        };
        assert!(bad.validate().is_err());
    }
}
