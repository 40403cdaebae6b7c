//! 트레이딩 시그널 및 주문 레코드 — 버스 메시지의 스키마.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{
    MarketRegime, OrderType, RiskTag, SellReason, SignalType, TradeTier, TradeType,
};
use super::stock::StockCode;
use crate::error::DomainError;

/// 매수 시그널 (Scanner → Buy Executor, `stream:buy-signals`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuySignal {
    pub stock_code: StockCode,
    pub stock_name: String,
    pub signal_type: SignalType,
    /// 시그널 발생 시점 가격
    pub signal_price: Decimal,
    pub llm_score: f64,
    pub hybrid_score: f64,
    pub trade_tier: TradeTier,
    #[serde(default = "default_risk_tag")]
    pub risk_tag: RiskTag,
    pub market_regime: MarketRegime,
    /// scanner | conviction | manual
    #[serde(default = "default_source")]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub rsi_value: Option<f64>,
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    #[serde(default)]
    pub vwap: Option<f64>,
    #[serde(default)]
    pub sector_group: Option<super::enums::SectorGroup>,
    /// 매크로 포지션 배율 [0.3, 2.0]
    #[serde(default = "default_pos_mult")]
    pub position_multiplier: f64,
}

fn default_risk_tag() -> RiskTag {
    RiskTag::Neutral
}

fn default_source() -> String {
    "scanner".to_string()
}

fn default_pos_mult() -> f64 {
    1.0
}

impl BuySignal {
    /// 발행 전 불변식 — BLOCKED 티어는 생성 자체를 거부.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.trade_tier == TradeTier::Blocked {
            return Err(DomainError::InvariantViolation(format!(
                "{}: BLOCKED 티어 시그널은 발행 불가",
                self.stock_code
            )));
        }
        if self.signal_price <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "{}: 시그널 가격이 양수가 아님",
                self.stock_code
            )));
        }
        if !(0.3..=2.0).contains(&self.position_multiplier) {
            return Err(DomainError::InvariantViolation(format!(
                "{}: position_multiplier 범위 초과 ({})",
                self.stock_code, self.position_multiplier
            )));
        }
        Ok(())
    }
}

/// 매도 주문 (Monitor/Telegram → Sell Executor, `stream:sell-orders`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellOrder {
    pub stock_code: StockCode,
    pub stock_name: String,
    pub sell_reason: SellReason,
    pub current_price: Decimal,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub buy_price: Option<Decimal>,
    #[serde(default)]
    pub profit_pct: Option<f64>,
    #[serde(default)]
    pub holding_days: Option<i64>,
}

impl SellOrder {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= 0 {
            return Err(DomainError::InvariantViolation(format!(
                "{}: 매도 수량이 양수가 아님 ({})",
                self.stock_code, self.quantity
            )));
        }
        Ok(())
    }
}

/// Gateway 주문 요청.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub stock_code: StockCode,
    pub quantity: i64,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    /// 지정가 주문 시 필수
    #[serde(default)]
    pub price: Option<Decimal>,
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

impl OrderRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= 0 {
            return Err(DomainError::InvariantViolation(
                "주문 수량이 양수가 아님".to_string(),
            ));
        }
        if self.order_type == OrderType::Limit && self.price.is_none() {
            return Err(DomainError::InvariantViolation(
                "지정가 주문에 가격 없음".to_string(),
            ));
        }
        Ok(())
    }
}

/// Gateway 주문 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    #[serde(default)]
    pub order_no: Option<String>,
    pub stock_code: StockCode,
    pub quantity: i64,
    #[serde(default)]
    pub filled_quantity: i64,
    #[serde(default)]
    pub avg_fill_price: Option<Decimal>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 주문 체결 상태 (Gateway `/api/trading/order-status`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatus {
    pub filled: bool,
    pub filled_qty: i64,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
}

/// 체결된 거래 기록 — append-only 로그 (`stream:trade-records`).
///
/// 재기동 후 쿨다운/중복 주문 윈도우 재구성에 사용됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub stock_code: StockCode,
    pub stock_name: String,
    pub trade_type: TradeType,
    pub quantity: i64,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub reason: String,
    #[serde(default)]
    pub sell_reason: Option<SellReason>,
    #[serde(default)]
    pub profit_pct: Option<f64>,
    #[serde(default)]
    pub profit_amount: Option<Decimal>,
    #[serde(default)]
    pub holding_days: Option<i64>,
    #[serde(default)]
    pub market_regime: Option<MarketRegime>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal(tier: TradeTier) -> BuySignal {
        BuySignal {
            stock_code: StockCode::new("005930").unwrap(),
            stock_name: "삼성전자".to_string(),
            signal_type: SignalType::GoldenCross,
            signal_price: dec!(72100),
            llm_score: 72.0,
            hybrid_score: 78.0,
            trade_tier: tier,
            risk_tag: RiskTag::Neutral,
            market_regime: MarketRegime::Bull,
            source: "scanner".to_string(),
            timestamp: Utc::now(),
            rsi_value: Some(58.2),
            volume_ratio: Some(1.8),
            vwap: Some(71900.0),
            sector_group: None,
            position_multiplier: 1.0,
        }
    }

    #[test]
    fn blocked_signal_rejected_at_construction() {
        assert!(signal(TradeTier::Blocked).validate().is_err());
        assert!(signal(TradeTier::Tier1).validate().is_ok());
    }

    #[test]
    fn buy_signal_serde_roundtrip() {
        let sig = signal(TradeTier::Tier1);
        let json = serde_json::to_string(&sig).unwrap();
        let back: BuySignal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stock_code, sig.stock_code);
        assert_eq!(back.signal_type, sig.signal_type);
        assert_eq!(back.signal_price, sig.signal_price);
        assert_eq!(back.position_multiplier, sig.position_multiplier);
    }

    #[test]
    fn limit_order_requires_price() {
        let req = OrderRequest {
            stock_code: StockCode::new("005930").unwrap(),
            quantity: 10,
            order_type: OrderType::Limit,
            price: None,
        };
        assert!(req.validate().is_err());

        let req = OrderRequest {
            price: Some(dec!(72100)),
            ..req
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn sell_order_unknown_fields_ignored() {
        let json = r#"{
            "stock_code": "047040",
            "stock_name": "대우건설",
            "sell_reason": "BREAKEVEN_STOP",
            "current_price": "10020",
            "quantity": 100,
            "timestamp": "2025-07-01T02:00:00Z",
            "operator_note": "unused"
        }"#;
        let order: SellOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.sell_reason, SellReason::BreakevenStop);
        assert_eq!(order.quantity, 100);
    }
}
