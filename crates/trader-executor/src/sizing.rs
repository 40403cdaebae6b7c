//! 포지션 사이징.
//!
//! 목표 명목가 = 총자산 × 기본 비중(hybrid 점수 티어) × 시그널 배율 ×
//! 매크로 배율. 가용 현금으로 클램프한 뒤 수량으로 환산하고,
//! 최소 주문 금액 미달이면 TOO_SMALL로 거부합니다.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// hybrid 점수 티어별 기본 비중 (%).
pub fn base_weight_pct(hybrid_score: f64) -> f64 {
    if hybrid_score >= 80.0 {
        12.0
    } else if hybrid_score >= 70.0 {
        9.0
    } else if hybrid_score >= 60.0 {
        6.0
    } else {
        4.0
    }
}

/// 사이징 입력.
#[derive(Debug, Clone)]
pub struct SizingInput {
    pub hybrid_score: f64,
    /// 시그널에 실린 배율 [0.3, 2.0]
    pub signal_multiplier: f64,
    /// 매크로 컨텍스트 배율 [0.3, 2.0]
    pub context_multiplier: f64,
    pub total_asset: Decimal,
    pub available_cash: Decimal,
    pub price: Decimal,
    /// 최소 주문 금액 (원)
    pub min_order_amount: i64,
}

/// 사이징 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizingOutcome {
    Quantity(i64),
    /// 최소 주문 금액 미달
    TooSmall,
}

/// 수량 계산.
pub fn calculate_quantity(input: &SizingInput) -> SizingOutcome {
    if input.price <= Decimal::ZERO || input.total_asset <= Decimal::ZERO {
        return SizingOutcome::TooSmall;
    }

    let weight = base_weight_pct(input.hybrid_score) / 100.0;
    let multiplier = weight
        * input.signal_multiplier.clamp(0.3, 2.0)
        * input.context_multiplier.clamp(0.3, 2.0);

    let target_notional = input.total_asset
        * Decimal::from_f64(multiplier).unwrap_or(Decimal::ZERO);
    let notional = target_notional.min(input.available_cash);
    if notional <= Decimal::ZERO {
        return SizingOutcome::TooSmall;
    }

    let quantity = (notional / input.price)
        .floor()
        .to_i64()
        .unwrap_or(0);
    if quantity <= 0 {
        return SizingOutcome::TooSmall;
    }

    let order_amount = Decimal::from(quantity) * input.price;
    if order_amount < Decimal::from(input.min_order_amount) {
        return SizingOutcome::TooSmall;
    }

    SizingOutcome::Quantity(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(hybrid: f64, total: Decimal, cash: Decimal, price: Decimal) -> SizingInput {
        SizingInput {
            hybrid_score: hybrid,
            signal_multiplier: 1.0,
            context_multiplier: 1.0,
            total_asset: total,
            available_cash: cash,
            price,
            min_order_amount: 100_000,
        }
    }

    #[test]
    fn weight_tiers() {
        assert_eq!(base_weight_pct(85.0), 12.0);
        assert_eq!(base_weight_pct(80.0), 12.0);
        assert_eq!(base_weight_pct(79.9), 9.0);
        assert_eq!(base_weight_pct(70.0), 9.0);
        assert_eq!(base_weight_pct(60.0), 6.0);
        assert_eq!(base_weight_pct(59.9), 4.0);
    }

    #[test]
    fn sizing_basic() {
        // 총자산 10M × 9% (hybrid 78) = 900,000 → 72,100원이면 12주
        let out = calculate_quantity(&input(78.0, dec!(10000000), dec!(10000000), dec!(72100)));
        assert_eq!(out, SizingOutcome::Quantity(12));
    }

    #[test]
    fn sizing_clamped_by_cash() {
        // 목표 900,000이지만 현금 500,000 → 6주
        let out = calculate_quantity(&input(78.0, dec!(10000000), dec!(500000), dec!(72100)));
        assert_eq!(out, SizingOutcome::Quantity(6));
    }

    #[test]
    fn sizing_multipliers_compose() {
        let mut i = input(78.0, dec!(10000000), dec!(10000000), dec!(72100));
        i.signal_multiplier = 0.5;
        i.context_multiplier = 0.8;
        // 900,000 × 0.4 = 360,000 → 4주 (288,400)
        assert_eq!(calculate_quantity(&i), SizingOutcome::Quantity(4));
    }

    #[test]
    fn sizing_too_small() {
        // 4% 비중 × 2M = 80,000 < 최소 100,000
        let out = calculate_quantity(&input(50.0, dec!(2000000), dec!(2000000), dec!(72100)));
        assert_eq!(out, SizingOutcome::TooSmall);
    }

    #[test]
    fn sizing_multiplier_clamped_to_valid_range() {
        let mut i = input(78.0, dec!(10000000), dec!(10000000), dec!(72100));
        i.signal_multiplier = 10.0; // 2.0으로 클램프
        i.context_multiplier = 1.0;
        // 900,000 × 2.0 = 1,800,000 → 24주
        assert_eq!(calculate_quantity(&i), SizingOutcome::Quantity(24));
    }
}
