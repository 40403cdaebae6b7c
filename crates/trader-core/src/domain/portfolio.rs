//! 포지션 및 포트폴리오 레코드.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::SectorGroup;
use super::stock::StockCode;
use crate::error::DomainError;

/// 보유 포지션.
///
/// 수량/평단은 증권사 잔고가 진실이며, 로컬 메타데이터(고점, 손절선,
/// 섹터, 매수시각)는 [`PositionMeta`]로 병합됩니다. 쓰기 주체는 마지막으로
/// 해당 코드를 처리한 실행기 하나이고, 리더는 시점 스냅샷을 봅니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub stock_code: StockCode,
    pub stock_name: String,
    pub quantity: i64,
    pub average_buy_price: Decimal,
    pub total_buy_amount: Decimal,
    #[serde(default)]
    pub sector_group: Option<SectorGroup>,
    #[serde(default)]
    pub high_watermark: Decimal,
    #[serde(default)]
    pub stop_loss_price: Decimal,
    #[serde(default)]
    pub bought_at: Option<DateTime<Utc>>,
    /// 평가액 (잔고 조회 시 증권사 제공)
    #[serde(default)]
    pub current_value: Option<Decimal>,
    /// 현재가 (잔고 조회 시 증권사 제공)
    #[serde(default)]
    pub current_price: Option<Decimal>,
}

impl Position {
    /// 영속 시점 불변식.
    ///
    /// - `quantity > 0`
    /// - `total_buy_amount == quantity × average_buy_price`
    /// - `high_watermark ≥ average_buy_price` (생성 시점)
    pub fn validate_for_persist(&self) -> Result<(), DomainError> {
        if self.quantity <= 0 {
            return Err(DomainError::InvariantViolation(format!(
                "{}: 수량이 양수가 아님 ({})",
                self.stock_code, self.quantity
            )));
        }
        let expected = Decimal::from(self.quantity) * self.average_buy_price;
        if self.total_buy_amount != expected {
            return Err(DomainError::InvariantViolation(format!(
                "{}: 매수금액 불일치 ({} != {})",
                self.stock_code, self.total_buy_amount, expected
            )));
        }
        if self.high_watermark < self.average_buy_price {
            return Err(DomainError::InvariantViolation(format!(
                "{}: 고점({})이 평단({}) 미만",
                self.stock_code, self.high_watermark, self.average_buy_price
            )));
        }
        Ok(())
    }

    /// 현재가 기준 수익률 (%). 평단이 0이면 None.
    pub fn profit_pct(&self, current_price: Decimal) -> Option<f64> {
        if self.average_buy_price <= Decimal::ZERO {
            return None;
        }
        let ratio = (current_price - self.average_buy_price) / self.average_buy_price;
        ratio.to_f64().map(|r| r * 100.0)
    }
}

/// 포트폴리오 상태 — 증권사 잔고에서 매번 재구성, 저장하지 않음.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub positions: Vec<Position>,
    pub cash_balance: Decimal,
    pub total_asset: Decimal,
    pub stock_eval_amount: Decimal,
    pub position_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl PortfolioState {
    /// 현금 비율 [0, 1]. 총자산이 0이면 1.0 (전액 현금으로 간주).
    pub fn cash_ratio(&self) -> f64 {
        if self.total_asset <= Decimal::ZERO {
            return 1.0;
        }
        (self.cash_balance / self.total_asset).to_f64().unwrap_or(1.0)
    }

    pub fn holds(&self, code: &StockCode) -> bool {
        self.positions.iter().any(|p| &p.stock_code == code)
    }

    pub fn position(&self, code: &StockCode) -> Option<&Position> {
        self.positions.iter().find(|p| &p.stock_code == code)
    }
}

/// 포지션 로컬 메타데이터 — 캐시 `position:meta:{code}`.
///
/// 생성은 매수 실행기, 고점/스케일아웃 갱신은 모니터, 삭제는 매도 실행기.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionMeta {
    pub stock_code: StockCode,
    #[serde(default)]
    pub sector_group: Option<SectorGroup>,
    pub high_watermark: Decimal,
    pub stop_loss_price: Decimal,
    pub bought_at: DateTime<Utc>,
    /// 스케일아웃 사다리 커서 (0..levels.len())
    #[serde(default)]
    pub scale_out_level: usize,
    /// RSI 과열 부분 매도 1회 실행 여부
    #[serde(default)]
    pub rsi_sold: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(qty: i64, avg: Decimal, total: Decimal, hw: Decimal) -> Position {
        Position {
            stock_code: StockCode::new("005930").unwrap(),
            stock_name: "삼성전자".to_string(),
            quantity: qty,
            average_buy_price: avg,
            total_buy_amount: total,
            sector_group: None,
            high_watermark: hw,
            stop_loss_price: dec!(0),
            bought_at: None,
            current_value: None,
            current_price: None,
        }
    }

    #[test]
    fn persist_invariants() {
        // 정상
        assert!(position(12, dec!(72120), dec!(865440), dec!(72120))
            .validate_for_persist()
            .is_ok());
        // 수량 0
        assert!(position(0, dec!(72120), dec!(0), dec!(72120))
            .validate_for_persist()
            .is_err());
        // 금액 불일치
        assert!(position(12, dec!(72120), dec!(865441), dec!(72120))
            .validate_for_persist()
            .is_err());
        // 고점 < 평단
        assert!(position(12, dec!(72120), dec!(865440), dec!(72000))
            .validate_for_persist()
            .is_err());
    }

    #[test]
    fn profit_pct_from_prices() {
        let pos = position(100, dec!(10000), dec!(1000000), dec!(10000));
        let pct = pos.profit_pct(dec!(10400)).unwrap();
        assert!((pct - 4.0).abs() < 1e-9);
    }

    #[test]
    fn cash_ratio() {
        let state = PortfolioState {
            positions: vec![],
            cash_balance: dec!(2400000),
            total_asset: dec!(10000000),
            stock_eval_amount: dec!(7600000),
            position_count: 0,
            timestamp: Utc::now(),
        };
        assert!((state.cash_ratio() - 0.24).abs() < 1e-9);
    }
}
