//! Exit chain — 다층 매도 조건 판정.
//!
//! 우선순위는 하드 계약이며 첫 매칭이 결과입니다:
//!
//! ```text
//!  0.  Hard Stop        (-10% 즉시 전량)
//!  1.  Profit Floor     (+15% 도달 후 +10% 미만 → 전량)
//!  2.  Profit Lock      (ATR 동적 트리거 L1/L2, floor 0.7%/2.0%)
//!  2.5 Breakeven Stop   (+3% 도달 후 +0.3% 미만 → 전량)
//!  3.  ATR Stop         (buy − ATR×mult 이하 → 전량)
//!  4.  Fixed Stop       (시간 조임 적용, 전량)
//!  5.  Trailing TP      (활성 +4%, 고점 대비 −3% → 전량)
//!  6.  Scale-Out        (국면별 사다리, 15~25% 부분)
//!  7.  RSI Overbought   (RSI≥75 & +3% → 50%, 트레일링 활성 시 스킵)
//!  8.  Target Profit    (트레일링 비활성 폴백, +10% 전량)
//!  9.  Death Cross      (BULL 계열 비활성)
//! 10.  Time Exit        (최대 보유일 초과)
//! ```

use trader_core::config::SellConfig;
use trader_core::{MarketRegime, SellReason, StockCode};

/// 포지션 평가 컨텍스트 — 모니터가 틱마다 구성.
#[derive(Debug, Clone)]
pub struct PositionContext {
    pub stock_code: StockCode,
    pub current_price: f64,
    pub buy_price: f64,
    pub quantity: i64,
    pub profit_pct: f64,
    /// 보유 중 최고가
    pub high_watermark: f64,
    /// 최고가 기준 수익률 (%)
    pub high_profit_pct: f64,
    pub atr: f64,
    pub rsi: Option<f64>,
    pub holding_days: i64,
    /// 스케일아웃 사다리 커서
    pub scale_out_level: usize,
    /// RSI 부분 매도 기실행 여부
    pub rsi_sold: bool,
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub prev_ma5: Option<f64>,
    pub prev_ma20: Option<f64>,
}

/// 매도 판정.
#[derive(Debug, Clone)]
pub struct ExitDecision {
    pub reason: SellReason,
    /// 0~100: 매도 비율
    pub quantity_pct: f64,
    pub description: String,
}

impl ExitDecision {
    fn full(reason: SellReason, description: String) -> Self {
        Self {
            reason,
            quantity_pct: 100.0,
            description,
        }
    }
}

/// [0] Hard Stop: 갭하락 오버라이드.
fn check_hard_stop(ctx: &PositionContext, cfg: &SellConfig) -> Option<ExitDecision> {
    if ctx.profit_pct <= -cfg.hard_stop_pct {
        return Some(ExitDecision::full(
            SellReason::StopLoss,
            format!("하드 스톱 {:.1}% <= -{:.0}%", ctx.profit_pct, cfg.hard_stop_pct),
        ));
    }
    None
}

/// [1] Profit Floor: 큰 수익 도달 후 되돌림 방어.
fn check_profit_floor(ctx: &PositionContext, cfg: &SellConfig) -> Option<ExitDecision> {
    if ctx.high_profit_pct >= cfg.profit_floor_activation_pct
        && ctx.profit_pct < cfg.profit_floor_level_pct
    {
        return Some(ExitDecision::full(
            SellReason::ProfitFloor,
            format!(
                "수익 플로어: 고점 {:.1}% >= {:.0}%, 현재 {:.1}% < {:.0}%",
                ctx.high_profit_pct,
                cfg.profit_floor_activation_pct,
                ctx.profit_pct,
                cfg.profit_floor_level_pct
            ),
        ));
    }
    None
}

/// [2] Profit Lock: ATR 기반 동적 트리거. L2(고수익) → L1(초기 수익) 순.
fn check_profit_lock(ctx: &PositionContext, cfg: &SellConfig) -> Option<ExitDecision> {
    if ctx.buy_price <= 0.0 || ctx.atr <= 0.0 {
        return None;
    }
    let atr_pct = ctx.atr / ctx.buy_price * 100.0;

    let l2_trigger = (atr_pct * cfg.profit_lock_l2_mult)
        .clamp(cfg.profit_lock_l2_min, cfg.profit_lock_l2_max);
    if ctx.high_profit_pct >= l2_trigger && ctx.profit_pct < cfg.profit_lock_l2_floor {
        return Some(ExitDecision::full(
            SellReason::ProfitLock,
            format!(
                "Profit Lock L2: 고점 {:.1}% >= 트리거 {:.1}%, 현재 {:.1}% < {:.1}%",
                ctx.high_profit_pct, l2_trigger, ctx.profit_pct, cfg.profit_lock_l2_floor
            ),
        ));
    }

    let l1_trigger = (atr_pct * cfg.profit_lock_l1_mult)
        .clamp(cfg.profit_lock_l1_min, cfg.profit_lock_l1_max);
    if ctx.high_profit_pct >= l1_trigger && ctx.profit_pct < cfg.profit_lock_l1_floor {
        return Some(ExitDecision::full(
            SellReason::ProfitLock,
            format!(
                "Profit Lock L1: 고점 {:.1}% >= 트리거 {:.1}%, 현재 {:.1}% < {:.1}%",
                ctx.high_profit_pct, l1_trigger, ctx.profit_pct, cfg.profit_lock_l1_floor
            ),
        ));
    }
    None
}

/// [2.5] Breakeven Stop: 랠리 실패 본전 방어.
fn check_breakeven_stop(ctx: &PositionContext, cfg: &SellConfig) -> Option<ExitDecision> {
    if !cfg.breakeven_enabled {
        return None;
    }
    if ctx.high_profit_pct >= cfg.breakeven_activation_pct
        && ctx.profit_pct < cfg.breakeven_floor_pct
    {
        return Some(ExitDecision::full(
            SellReason::BreakevenStop,
            format!(
                "본전 스톱: 고점 {:.3}% >= {:.1}%, 현재 {:.3}% < {:.1}%",
                ctx.high_profit_pct,
                cfg.breakeven_activation_pct,
                ctx.profit_pct,
                cfg.breakeven_floor_pct
            ),
        ));
    }
    None
}

/// [3] ATR Stop.
fn check_atr_stop(
    ctx: &PositionContext,
    cfg: &SellConfig,
    macro_stop_mult: f64,
) -> Option<ExitDecision> {
    if ctx.atr <= 0.0 {
        return None;
    }
    let stop_price = ctx.buy_price - ctx.atr * cfg.atr_multiplier * macro_stop_mult;
    if ctx.current_price <= stop_price {
        return Some(ExitDecision::full(
            SellReason::AtrStop,
            format!(
                "ATR 스톱: {:.0} <= {:.0} (ATR {:.0})",
                ctx.current_price, stop_price, ctx.atr
            ),
        ));
    }
    None
}

/// [4] Fixed Stop + time-tightening.
///
/// 보유일이 국면별 시작일을 넘으면 손절선을 최대 2%p까지 0 방향으로
/// 점진 축소합니다.
fn check_fixed_stop(
    ctx: &PositionContext,
    cfg: &SellConfig,
    macro_stop_mult: f64,
    regime: MarketRegime,
) -> Option<ExitDecision> {
    let mut threshold = -cfg.stop_loss_pct * macro_stop_mult;

    let start_days = cfg.time_tighten_start(regime);
    if cfg.time_tighten_enabled && ctx.holding_days > start_days {
        let days_over = (ctx.holding_days - start_days) as f64;
        let max_span = (cfg.max_holding_days - start_days) as f64;
        if max_span > 0.0 {
            let tighten = (cfg.time_tighten_max_reduction_pct * days_over / max_span)
                .min(cfg.time_tighten_max_reduction_pct);
            threshold += tighten;
        }
    }
    // 조임은 0을 넘지 않음
    threshold = threshold.min(0.0);

    if ctx.profit_pct <= threshold {
        return Some(ExitDecision::full(
            SellReason::StopLoss,
            format!(
                "고정 손절: {:.2}% <= {:.2}% (보유 {}일)",
                ctx.profit_pct, threshold, ctx.holding_days
            ),
        ));
    }
    None
}

/// [5] Trailing Take-Profit.
fn check_trailing_tp(ctx: &PositionContext, cfg: &SellConfig) -> Option<ExitDecision> {
    if !cfg.trailing_enabled {
        return None;
    }
    if ctx.high_profit_pct < cfg.trailing_activation_pct {
        return None;
    }
    let trailing_stop = ctx.high_watermark * (1.0 - cfg.trailing_drop_from_high_pct / 100.0);
    if ctx.current_price <= trailing_stop {
        return Some(ExitDecision::full(
            SellReason::TrailingStop,
            format!(
                "트레일링: {:.0} <= {:.0} (고점 {:.0}, 허용 낙폭 {:.1}%)",
                ctx.current_price, trailing_stop, ctx.high_watermark, cfg.trailing_drop_from_high_pct
            ),
        ));
    }
    None
}

/// [6] Scale-Out: 국면별 사다리 한 단계씩 부분 익절.
fn check_scale_out(
    ctx: &PositionContext,
    cfg: &SellConfig,
    regime: MarketRegime,
) -> Option<ExitDecision> {
    if !cfg.scale_out_enabled {
        return None;
    }
    let levels = cfg.scale_out_levels(regime);
    if ctx.scale_out_level >= levels.len() {
        return None;
    }
    let (target_pct, mut sell_pct) = levels[ctx.scale_out_level];
    if ctx.profit_pct < target_pct {
        return None;
    }

    // 최소 거래 가드: 트랜치가 너무 작으면 스킵하거나 전량 전환
    let estimated_qty = ((ctx.quantity as f64) * sell_pct / 100.0).floor().max(1.0) as i64;
    let tranche_value = estimated_qty as f64 * ctx.current_price;
    let remaining = ctx.quantity - estimated_qty;

    if tranche_value < cfg.min_transaction_amount as f64
        || estimated_qty < cfg.min_sell_quantity
    {
        let total_value = ctx.quantity as f64 * ctx.current_price;
        if total_value < (cfg.min_transaction_amount * 2) as f64 {
            sell_pct = 100.0;
        } else {
            return None;
        }
    } else if remaining < cfg.min_sell_quantity && sell_pct < 100.0 {
        // 잔량이 부스러기면 전량 전환
        sell_pct = 100.0;
    }

    Some(ExitDecision {
        reason: SellReason::ScaleOut,
        quantity_pct: sell_pct,
        description: format!(
            "스케일아웃 L{}: {:.1}% >= 목표 {:.0}% → {:.0}% 매도",
            ctx.scale_out_level, ctx.profit_pct, target_pct, sell_pct
        ),
    })
}

/// [7] RSI 과열 부분 매도. 트레일링 활성 구간에서는 스킵.
fn check_rsi_overbought(ctx: &PositionContext, cfg: &SellConfig) -> Option<ExitDecision> {
    if ctx.rsi_sold {
        return None;
    }
    // 트레일링이 이미 활성화된 포지션은 그쪽이 관리
    if cfg.trailing_enabled && ctx.high_profit_pct >= cfg.trailing_activation_pct {
        return None;
    }
    let rsi = ctx.rsi?;
    if rsi >= cfg.rsi_overbought_threshold && ctx.profit_pct >= cfg.rsi_min_profit_pct {
        return Some(ExitDecision {
            reason: SellReason::RsiOverbought,
            quantity_pct: 50.0,
            description: format!(
                "RSI 과열: {:.1} >= {:.0}, 수익 {:.1}%",
                rsi, cfg.rsi_overbought_threshold, ctx.profit_pct
            ),
        });
    }
    None
}

/// [8] Target Profit — 트레일링 비활성 시 폴백.
fn check_profit_target(ctx: &PositionContext, cfg: &SellConfig) -> Option<ExitDecision> {
    if cfg.trailing_enabled {
        return None;
    }
    if ctx.profit_pct >= cfg.profit_target_pct {
        return Some(ExitDecision::full(
            SellReason::ProfitTarget,
            format!(
                "목표 수익: {:.1}% >= {:.0}%",
                ctx.profit_pct, cfg.profit_target_pct
            ),
        ));
    }
    None
}

/// [9] Death Cross: 손실 중 MA5/MA20 하향 돌파. BULL 계열 비활성.
fn check_death_cross(
    ctx: &PositionContext,
    cfg: &SellConfig,
    regime: MarketRegime,
) -> Option<ExitDecision> {
    if cfg.death_cross_bear_only && regime.is_bull() {
        return None;
    }
    let (ma5, ma20, prev_ma5, prev_ma20) =
        (ctx.ma5?, ctx.ma20?, ctx.prev_ma5?, ctx.prev_ma20?);
    let crossed_down = prev_ma5 >= prev_ma20 && ma5 < ma20;
    if crossed_down && ctx.profit_pct < 0.0 {
        return Some(ExitDecision::full(
            SellReason::DeathCross,
            format!(
                "데드크로스: MA5 {:.0} < MA20 {:.0}, 수익 {:.1}%",
                ma5, ma20, ctx.profit_pct
            ),
        ));
    }
    None
}

/// [10] Time Exit.
fn check_time_exit(ctx: &PositionContext, cfg: &SellConfig) -> Option<ExitDecision> {
    if ctx.holding_days > cfg.max_holding_days {
        return Some(ExitDecision::full(
            SellReason::TimeExit,
            format!(
                "보유 기간 초과: {}일 > {}일",
                ctx.holding_days, cfg.max_holding_days
            ),
        ));
    }
    None
}

/// 전체 체인 평가 — 첫 매칭 반환. 규칙은 상호 배타적으로 평가됩니다.
pub fn evaluate_exit(
    ctx: &PositionContext,
    regime: MarketRegime,
    macro_stop_mult: f64,
    cfg: &SellConfig,
) -> Option<ExitDecision> {
    check_hard_stop(ctx, cfg)
        .or_else(|| check_profit_floor(ctx, cfg))
        .or_else(|| check_profit_lock(ctx, cfg))
        .or_else(|| check_breakeven_stop(ctx, cfg))
        .or_else(|| check_atr_stop(ctx, cfg, macro_stop_mult))
        .or_else(|| check_fixed_stop(ctx, cfg, macro_stop_mult, regime))
        .or_else(|| check_trailing_tp(ctx, cfg))
        .or_else(|| check_scale_out(ctx, cfg, regime))
        .or_else(|| check_rsi_overbought(ctx, cfg))
        .or_else(|| check_profit_target(ctx, cfg))
        .or_else(|| check_death_cross(ctx, cfg, regime))
        .or_else(|| check_time_exit(ctx, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SellConfig {
        trader_core::AppConfig::from_env().unwrap().sell
    }

    fn ctx(buy: f64, price: f64, high: f64) -> PositionContext {
        PositionContext {
            stock_code: StockCode::new("047040").unwrap(),
            current_price: price,
            buy_price: buy,
            quantity: 100,
            profit_pct: (price / buy - 1.0) * 100.0,
            high_watermark: high,
            high_profit_pct: (high / buy - 1.0) * 100.0,
            atr: 0.0,
            rsi: None,
            holding_days: 1,
            scale_out_level: 0,
            rsi_sold: false,
            ma5: None,
            ma20: None,
            prev_ma5: None,
            prev_ma20: None,
        }
    }

    #[test]
    fn hard_stop_fires_at_minus_ten() {
        let decision = evaluate_exit(
            &ctx(10_000.0, 9_000.0, 10_000.0),
            MarketRegime::Sideways,
            1.0,
            &cfg(),
        )
        .unwrap();
        assert_eq!(decision.reason, SellReason::StopLoss);
        assert_eq!(decision.quantity_pct, 100.0);
    }

    #[test]
    fn breakeven_boundary_2999_no_fire() {
        // 고점 +2.999% — 활성화 전
        let context = ctx(10_000.0, 10_020.0, 10_299.9);
        assert!((context.high_profit_pct - 2.999).abs() < 1e-6);
        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg());
        // 본전 스톱은 안 걸림 (다른 규칙도 해당 없음)
        assert!(decision.is_none());
    }

    #[test]
    fn breakeven_boundary_3000_fires() {
        // 고점 +3.000%, 현재 +0.299% → rule 2.5
        let context = ctx(10_000.0, 10_029.9, 10_300.0);
        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg()).unwrap();
        assert_eq!(decision.reason, SellReason::BreakevenStop);
        assert_eq!(decision.quantity_pct, 100.0);
    }

    #[test]
    fn breakeven_scenario_failed_rally() {
        // 10,000 매수 → 10,400 고점(+4%) → 10,020(+0.2%)
        let context = ctx(10_000.0, 10_020.0, 10_400.0);
        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg()).unwrap();
        assert_eq!(decision.reason, SellReason::BreakevenStop);
    }

    #[test]
    fn trailing_fires_after_activation_and_drop() {
        // 시나리오: 72,120 매수, 고점 75,100(+4.13%), 72,800 (고점 대비 -3.06%)
        let context = ctx(72_120.0, 72_800.0, 75_100.0);
        let decision = evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg()).unwrap();
        assert_eq!(decision.reason, SellReason::TrailingStop);
        assert_eq!(decision.quantity_pct, 100.0);
    }

    #[test]
    fn trailing_not_active_below_activation() {
        // 고점 +3.99% — 활성화 미달, 낙폭 커도 트레일링 없음
        let context = ctx(72_120.0, 72_900.0, 74_995.0);
        assert!(context.high_profit_pct < 4.0);
        let decision = evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg());
        // 본전 스톱 구간도 아님 (+1.08%)
        assert!(decision.is_none());
    }

    #[test]
    fn profit_floor_over_trailing_priority() {
        // 고점 +16%, 현재 +9.5% — rule 1이 rule 5보다 먼저
        let context = ctx(10_000.0, 10_950.0, 11_600.0);
        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg()).unwrap();
        assert_eq!(decision.reason, SellReason::ProfitFloor);
    }

    #[test]
    fn fixed_stop_time_tightening_boundary() {
        let cfg = cfg();
        // start=10, max=30, stop=6% → day 11: threshold = -6 + 2*1/20 = -5.9
        let mut context = ctx(10_000.0, 9_405.0, 10_000.0); // -5.95%
        context.holding_days = 11;
        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg).unwrap();
        assert_eq!(decision.reason, SellReason::StopLoss);

        // -5.85%는 통과
        let mut context = ctx(10_000.0, 9_415.0, 10_000.0);
        context.holding_days = 11;
        assert!(evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg).is_none());
    }

    #[test]
    fn fixed_stop_bull_tightening_starts_later() {
        let cfg = cfg();
        // BULL은 15일부터 조임 — 11일차 -5.95%는 생존
        let mut context = ctx(10_000.0, 9_405.0, 10_000.0);
        context.holding_days = 11;
        assert!(evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg).is_none());
    }

    #[test]
    fn macro_stop_multiplier_widens_stop() {
        // stop 6% × 1.2 = 7.2% — -6.5%는 생존
        let context = ctx(10_000.0, 9_350.0, 10_000.0);
        assert!(evaluate_exit(&context, MarketRegime::Sideways, 1.2, &cfg()).is_none());
        // ×1.0이면 발동
        assert!(evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg()).is_some());
    }

    #[test]
    fn scale_out_ladder_by_regime() {
        let cfg = cfg();
        // BULL 1단계 목표 +7%, 25% 매도
        let mut context = ctx(10_000.0, 10_750.0, 10_760.0);
        context.quantity = 100;
        let decision = evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg).unwrap();
        assert_eq!(decision.reason, SellReason::ScaleOut);
        assert_eq!(decision.quantity_pct, 25.0);

        // 커서 소진 시 더 이상 발동 없음
        context.scale_out_level = 3;
        assert!(evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg).is_none());
    }

    #[test]
    fn scale_out_bear_ladder_starts_at_two_pct() {
        let cfg = cfg();
        let mut context = ctx(10_000.0, 10_250.0, 10_260.0);
        context.quantity = 100;
        let decision = evaluate_exit(&context, MarketRegime::Bear, 1.0, &cfg).unwrap();
        assert_eq!(decision.reason, SellReason::ScaleOut);
        // BULL에서는 +2.5%로는 미발동
        assert!(evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg).is_none());
    }

    #[test]
    fn scale_out_min_trade_guard_promotes_full_exit() {
        let cfg = cfg();
        // 5주 × 10,250원 = 51,250 — 25% 트랜치(1주)는 최소 금액 미달,
        // 총액도 최소×2 미만 → 전량 전환
        let mut context = ctx(10_000.0, 10_250.0, 10_260.0);
        context.quantity = 5;
        let decision = evaluate_exit(&context, MarketRegime::Bear, 1.0, &cfg).unwrap();
        assert_eq!(decision.quantity_pct, 100.0);
    }

    #[test]
    fn rsi_overbought_half_exit_skipped_when_trailing_active() {
        let cfg = cfg();
        // BULL 사다리는 +7%부터라 스케일아웃에 선점되지 않음.
        // 수익 +3.5%, RSI 80 — 트레일링 미활성(고점 +3.6%) → 50% 매도
        let mut context = ctx(10_000.0, 10_350.0, 10_360.0);
        context.rsi = Some(80.0);
        let decision = evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg).unwrap();
        assert_eq!(decision.reason, SellReason::RsiOverbought);
        assert_eq!(decision.quantity_pct, 50.0);

        // 고점 +4.5% → 트레일링 활성 구간 — RSI 규칙 스킵.
        // (현재가가 트레일링 스톱 위라면 아무 규칙도 발동하지 않음)
        let mut context = ctx(10_000.0, 10_350.0, 10_450.0);
        context.rsi = Some(80.0);
        let decision = evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg);
        assert!(decision.is_none());
    }

    #[test]
    fn rsi_overbought_fires_once() {
        let cfg = cfg();
        let mut context = ctx(10_000.0, 10_350.0, 10_360.0);
        context.rsi = Some(80.0);
        context.rsi_sold = true;
        assert!(evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg).is_none());
    }

    #[test]
    fn death_cross_disabled_in_bull() {
        let cfg = cfg();
        let mut context = ctx(10_000.0, 9_700.0, 10_000.0);
        context.ma5 = Some(9_700.0);
        context.ma20 = Some(9_800.0);
        context.prev_ma5 = Some(9_810.0);
        context.prev_ma20 = Some(9_800.0);

        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg).unwrap();
        assert_eq!(decision.reason, SellReason::DeathCross);

        // BULL에서는 비활성
        assert!(evaluate_exit(&context, MarketRegime::Bull, 1.0, &cfg).is_none());
    }

    #[test]
    fn time_exit_after_max_holding() {
        let cfg = cfg();
        let mut context = ctx(10_000.0, 10_050.0, 10_100.0);
        context.holding_days = 31;
        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg).unwrap();
        assert_eq!(decision.reason, SellReason::TimeExit);

        // 정확히 30일은 보유 유지
        context.holding_days = 30;
        assert!(evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg).is_none());
    }

    #[test]
    fn chain_is_total_first_match_wins() {
        // -12%는 hard stop과 fixed stop 모두 해당 — hard stop(0번)이 선점
        let context = ctx(10_000.0, 8_800.0, 10_000.0);
        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg()).unwrap();
        assert_eq!(decision.reason, SellReason::StopLoss);
        assert!(decision.description.contains("하드 스톱"));
    }

    #[test]
    fn profit_lock_dynamic_trigger() {
        let cfg = cfg();
        // ATR 2% → L1 트리거 = clamp(2×1.5, 1.5, 3) = 3%
        // 고점 +3.2%, 현재 +0.5% < floor 0.7% → ProfitLock
        let mut context = ctx(10_000.0, 10_050.0, 10_320.0);
        context.atr = 200.0;
        let decision = evaluate_exit(&context, MarketRegime::Sideways, 1.0, &cfg).unwrap();
        assert_eq!(decision.reason, SellReason::ProfitLock);
    }
}
