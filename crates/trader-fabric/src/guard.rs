//! 포트폴리오 가드 — 매수 전 포트폴리오 수준 리스크 체크.
//!
//! 순수 함수로 구현되며 Buy Executor에서만 호출됩니다. 체크는 고정
//! 순서로 실행되고 첫 실패가 결과입니다:
//!
//! 1. 포트폴리오 종목 수 상한
//! 2. 일일 매수 한도 (국면별)
//! 3. 종목 금액 집중도 (15%, STRONG_BULL 25%)
//! 4. 섹터 금액 집중도 (30%, STRONG_BULL 50%)
//! 5. 국면별 현금 하한선

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use trader_core::config::RiskConfig;
use trader_core::{MarketRegime, PortfolioState, SectorGroup};

/// 가드 판정 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Pass,
    Block {
        check: &'static str,
        reason: String,
    },
}

impl GuardVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// 매수 후보에 대한 포트폴리오 가드 실행.
///
/// `buy_amount`는 예상 체결 금액(수량 × 현재가)입니다.
pub fn check_portfolio(
    buy_amount: Decimal,
    sector_group: Option<SectorGroup>,
    portfolio: &PortfolioState,
    regime: MarketRegime,
    daily_buy_count: u32,
    risk: &RiskConfig,
) -> GuardVerdict {
    // 1. 종목 수 상한
    if portfolio.position_count >= risk.max_portfolio_size {
        return GuardVerdict::Block {
            check: "PORTFOLIO_FULL",
            reason: format!(
                "보유 {}종목 >= 상한 {}",
                portfolio.position_count, risk.max_portfolio_size
            ),
        };
    }

    // 2. 일일 매수 한도
    let daily_limit = risk.daily_buy_limit(regime);
    if daily_buy_count >= daily_limit {
        return GuardVerdict::Block {
            check: "DAILY_LIMIT",
            reason: format!("일일 매수 {}회 >= 한도 {} ({})", daily_buy_count, daily_limit, regime),
        };
    }

    let total = portfolio.total_asset;
    if total <= Decimal::ZERO {
        // 자산 0이면 집중도/현금 체크 의미 없음 — 사이징에서 걸러짐
        return GuardVerdict::Pass;
    }

    // 3. 종목 금액 집중도
    let stock_cap = risk.stock_value_cap_pct(regime);
    let stock_pct = pct_of(buy_amount, total);
    if stock_pct > stock_cap {
        return GuardVerdict::Block {
            check: "STOCK_CONCENTRATION",
            reason: format!("종목 비중 {:.1}% > {:.0}%", stock_pct, stock_cap),
        };
    }

    // 4. 섹터 금액 집중도
    if let Some(sector) = sector_group {
        let sector_cap = risk.sector_value_cap_pct(regime);
        let sector_value: Decimal = portfolio
            .positions
            .iter()
            .filter(|p| p.sector_group == Some(sector))
            .map(|p| p.current_value.unwrap_or(p.total_buy_amount))
            .sum();
        let sector_pct = pct_of(sector_value + buy_amount, total);
        if sector_pct > sector_cap {
            return GuardVerdict::Block {
                check: "SECTOR_CONCENTRATION",
                reason: format!("섹터 비중 {:.1}% > {:.0}%", sector_pct, sector_cap),
            };
        }
    }

    // 5. 현금 하한선 — 매수 후 잔여 현금 비율 기준
    let floor_pct = risk.cash_floor_pct(regime);
    let cash_after = portfolio.cash_balance - buy_amount;
    let cash_after_pct = pct_of(cash_after, total);
    if cash_after_pct < floor_pct {
        return GuardVerdict::Block {
            check: "CASH_FLOOR",
            reason: format!(
                "매수 후 현금 {:.1}% < 하한 {:.0}% ({})",
                cash_after_pct, floor_pct, regime
            ),
        };
    }

    GuardVerdict::Pass
}

fn pct_of(part: Decimal, total: Decimal) -> f64 {
    (part / total).to_f64().unwrap_or(0.0) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use trader_core::{Position, StockCode};

    fn risk() -> RiskConfig {
        // 환경변수 미설정 상태의 기본값 사용
        trader_core::AppConfig::from_env().unwrap().risk
    }

    fn portfolio(cash: Decimal, total: Decimal, positions: Vec<Position>) -> PortfolioState {
        PortfolioState {
            position_count: positions.len(),
            positions,
            cash_balance: cash,
            total_asset: total,
            stock_eval_amount: total - cash,
            timestamp: Utc::now(),
        }
    }

    fn held(code: &str, sector: SectorGroup, value: Decimal) -> Position {
        Position {
            stock_code: StockCode::new(code).unwrap(),
            stock_name: code.to_string(),
            quantity: 1,
            average_buy_price: value,
            total_buy_amount: value,
            sector_group: Some(sector),
            high_watermark: value,
            stop_loss_price: dec!(0),
            bought_at: None,
            current_value: Some(value),
            current_price: None,
        }
    }

    #[test]
    fn cash_floor_blocks_in_bear() {
        // 총자산 10M, 현금 2.4M → 매수 없이도 24% < 25% (BEAR)
        let state = portfolio(dec!(2400000), dec!(10000000), vec![]);
        let verdict = check_portfolio(
            dec!(0),
            None,
            &state,
            MarketRegime::Bear,
            0,
            &risk(),
        );
        match verdict {
            GuardVerdict::Block { check, .. } => assert_eq!(check, "CASH_FLOOR"),
            GuardVerdict::Pass => panic!("BEAR 현금 하한 미적용"),
        }
    }

    #[test]
    fn cash_floor_passes_in_bull() {
        // BULL 하한 10% — 동일 포트폴리오 통과
        let state = portfolio(dec!(2400000), dec!(10000000), vec![]);
        let verdict = check_portfolio(
            dec!(1000000),
            None,
            &state,
            MarketRegime::Bull,
            0,
            &risk(),
        );
        assert!(verdict.passed());
    }

    #[test]
    fn portfolio_full_blocks() {
        let positions: Vec<Position> = (0..10)
            .map(|i| held(&format!("{:06}", i), SectorGroup::Etc, dec!(100000)))
            .collect();
        let state = portfolio(dec!(9000000), dec!(10000000), positions);
        let verdict = check_portfolio(
            dec!(100000),
            None,
            &state,
            MarketRegime::Bull,
            0,
            &risk(),
        );
        match verdict {
            GuardVerdict::Block { check, .. } => assert_eq!(check, "PORTFOLIO_FULL"),
            GuardVerdict::Pass => panic!("종목 수 상한 미적용"),
        }
    }

    #[test]
    fn daily_limit_is_regime_specific() {
        let state = portfolio(dec!(9000000), dec!(10000000), vec![]);
        // BEAR 한도 3
        let verdict = check_portfolio(
            dec!(100000),
            None,
            &state,
            MarketRegime::Bear,
            3,
            &risk(),
        );
        match verdict {
            GuardVerdict::Block { check, .. } => assert_eq!(check, "DAILY_LIMIT"),
            GuardVerdict::Pass => panic!("일일 한도 미적용"),
        }
        // BULL 한도 8 — 같은 카운트로 통과
        let verdict = check_portfolio(
            dec!(100000),
            None,
            &state,
            MarketRegime::Bull,
            3,
            &risk(),
        );
        assert!(verdict.passed());
    }

    #[test]
    fn sector_concentration_relaxed_in_strong_bull() {
        let positions = vec![held("005930", SectorGroup::SemiconductorIt, dec!(3500000))];
        let state = portfolio(dec!(6000000), dec!(10000000), positions);
        // 기존 35% + 1M → 45% > 30% (SIDEWAYS 차단)
        let verdict = check_portfolio(
            dec!(1000000),
            Some(SectorGroup::SemiconductorIt),
            &state,
            MarketRegime::Sideways,
            0,
            &risk(),
        );
        assert!(!verdict.passed());
        // STRONG_BULL 50% 완화 — 통과 (종목 비중 10% < 25%, 현금 50% > 5%)
        let verdict = check_portfolio(
            dec!(1000000),
            Some(SectorGroup::SemiconductorIt),
            &state,
            MarketRegime::StrongBull,
            0,
            &risk(),
        );
        assert!(verdict.passed());
    }

    #[test]
    fn stock_concentration_blocks() {
        let state = portfolio(dec!(9000000), dec!(10000000), vec![]);
        // 단일 매수 2M = 20% > 15% (BULL)
        let verdict = check_portfolio(
            dec!(2000000),
            None,
            &state,
            MarketRegime::Bull,
            0,
            &risk(),
        );
        match verdict {
            GuardVerdict::Block { check, .. } => assert_eq!(check, "STOCK_CONCENTRATION"),
            GuardVerdict::Pass => panic!("종목 집중도 미적용"),
        }
    }
}
