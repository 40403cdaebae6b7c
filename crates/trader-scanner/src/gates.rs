//! 리스크 게이트 — 시그널 발행 전 고정 순서 안전 체크.
//!
//! 순서는 계약입니다. 하나라도 실패하면 즉시 거부 (fail-fast):
//!
//! 1. 장초 노이즈 구간 (09:00–09:15)
//! 2. 장 후반 위험 구간 (14:00–15:00)
//! 3. 일일 매수 한도 (국면별)
//! 4. RSI 과열 — SIDEWAYS/BEAR 75, BULL 85
//!    (MOMENTUM_CONTINUATION / CONVICTION / ORB는 부분 우회)
//! 5. VWAP 상방 이격
//! 6. 동일 종목 시그널 쿨다운 (기본 600초)
//! 7. 손절 쿨다운 (3일)
//! 8. 매도 쿨다운 (24시간)
//! 9. Scout 거부권 (BLOCKED / 비거래)

use chrono::NaiveTime;

use trader_core::config::{RiskConfig, ScannerConfig};
use trader_core::time::{parse_hhmm, within_window};
use trader_core::{MarketRegime, SignalType, StockCode, TradeTier, WatchlistEntry};
use trader_fabric::{Cooldowns, DailyBuyCounter, FabricError};

/// 게이트 평가 결과.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    Pass,
    Fail { gate: &'static str, reason: String },
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }

    fn fail(gate: &'static str, reason: String) -> Self {
        Self::Fail { gate, reason }
    }
}

/// 순수 입력 (redis 비의존) — 단위 테스트 대상.
pub struct GateInput<'a> {
    pub signal_type: SignalType,
    pub entry: &'a WatchlistEntry,
    pub regime: MarketRegime,
    pub now_kst: NaiveTime,
    pub rsi: Option<f64>,
    pub current_price: f64,
    pub vwap: f64,
    /// 같은 코드의 마지막 시그널 이후 경과 초
    pub secs_since_last_signal: Option<u64>,
}

/// Gate 1–2: 시간 창.
pub fn check_windows(config: &ScannerConfig, now: NaiveTime) -> GateOutcome {
    let no_trade = (
        parse_hhmm(&config.no_trade_window_start),
        parse_hhmm(&config.no_trade_window_end),
    );
    if let (Some(start), Some(end)) = no_trade {
        if within_window(now, start, end) {
            return GateOutcome::fail(
                "no_trade_window",
                format!(
                    "장초 제한 구간 {}~{}",
                    config.no_trade_window_start, config.no_trade_window_end
                ),
            );
        }
    }

    let danger = (
        parse_hhmm(&config.danger_zone_start),
        parse_hhmm(&config.danger_zone_end),
    );
    if let (Some(start), Some(end)) = danger {
        if within_window(now, start, end) {
            return GateOutcome::fail(
                "danger_zone",
                format!(
                    "장 후반 위험 구간 {}~{}",
                    config.danger_zone_start, config.danger_zone_end
                ),
            );
        }
    }

    GateOutcome::Pass
}

/// Gate 4: RSI 과열. 일부 전략은 우회.
pub fn check_rsi_guard(
    config: &ScannerConfig,
    signal_type: SignalType,
    regime: MarketRegime,
    rsi: Option<f64>,
) -> GateOutcome {
    if signal_type.bypasses_rsi_guard() {
        return GateOutcome::Pass;
    }
    let Some(rsi) = rsi else {
        return GateOutcome::Pass;
    };
    let limit = config.rsi_guard_limit(regime);
    // 경계 포함: 정확히 한도값이면 거부
    if rsi >= limit {
        return GateOutcome::fail("rsi_guard", format!("RSI {:.2} >= {:.0}", rsi, limit));
    }
    GateOutcome::Pass
}

/// Gate 5: VWAP 상방 이격.
pub fn check_vwap_deviation(
    config: &ScannerConfig,
    current_price: f64,
    vwap: f64,
) -> GateOutcome {
    if vwap <= 0.0 {
        return GateOutcome::Pass;
    }
    let limit = config.vwap_deviation_warning;
    if current_price > vwap * (1.0 + limit) {
        let deviation = (current_price / vwap - 1.0) * 100.0;
        return GateOutcome::fail(
            "vwap_deviation",
            format!("VWAP 이격 +{:.2}% > {:.1}%", deviation, limit * 100.0),
        );
    }
    GateOutcome::Pass
}

/// Gate 6: 시그널 쿨다운.
pub fn check_signal_cooldown(
    config: &ScannerConfig,
    secs_since_last: Option<u64>,
) -> GateOutcome {
    if let Some(elapsed) = secs_since_last {
        if elapsed < config.signal_cooldown_seconds {
            return GateOutcome::fail(
                "signal_cooldown",
                format!(
                    "쿨다운 {}초 남음",
                    config.signal_cooldown_seconds - elapsed
                ),
            );
        }
    }
    GateOutcome::Pass
}

/// Gate 9: Scout 거부권.
pub fn check_scout_veto(entry: &WatchlistEntry) -> GateOutcome {
    if entry.trade_tier == TradeTier::Blocked {
        return GateOutcome::fail("scout_veto", "BLOCKED 티어".to_string());
    }
    if !entry.is_tradable {
        return GateOutcome::fail("scout_veto", "is_tradable=false".to_string());
    }
    GateOutcome::Pass
}

/// 전체 게이트 실행기.
pub struct RiskGates {
    cooldowns: Cooldowns,
    daily_counter: DailyBuyCounter,
}

impl RiskGates {
    pub fn new(cooldowns: Cooldowns, daily_counter: DailyBuyCounter) -> Self {
        Self {
            cooldowns,
            daily_counter,
        }
    }

    /// 고정 순서로 전체 게이트 평가. 첫 실패 즉시 반환.
    pub async fn check_all(
        &self,
        code: &StockCode,
        input: &GateInput<'_>,
        scanner_cfg: &ScannerConfig,
        risk_cfg: &RiskConfig,
    ) -> Result<GateOutcome, FabricError> {
        // 1–2. 시간 창
        let outcome = check_windows(scanner_cfg, input.now_kst);
        if !outcome.passed() {
            return Ok(outcome);
        }

        // 3. 일일 매수 한도
        let today = trader_core::time::kst_now().date_naive();
        let count = self.daily_counter.count(today).await?;
        let limit = risk_cfg.daily_buy_limit(input.regime);
        if count >= limit {
            return Ok(GateOutcome::fail(
                "daily_limit",
                format!("일일 매수 {}회 >= 한도 {}", count, limit),
            ));
        }

        // 4. RSI 과열
        let outcome = check_rsi_guard(scanner_cfg, input.signal_type, input.regime, input.rsi);
        if !outcome.passed() {
            return Ok(outcome);
        }

        // 5. VWAP 이격
        let outcome = check_vwap_deviation(scanner_cfg, input.current_price, input.vwap);
        if !outcome.passed() {
            return Ok(outcome);
        }

        // 6. 시그널 쿨다운
        let outcome = check_signal_cooldown(scanner_cfg, input.secs_since_last_signal);
        if !outcome.passed() {
            return Ok(outcome);
        }

        // 7. 손절 쿨다운
        if self.cooldowns.is_stoploss_cooldown(code).await? {
            return Ok(GateOutcome::fail(
                "stoploss_cooldown",
                "손절 후 재진입 제한".to_string(),
            ));
        }

        // 8. 매도 쿨다운
        if self.cooldowns.is_sell_cooldown(code).await? {
            return Ok(GateOutcome::fail(
                "sell_cooldown",
                "매도 후 24시간 제한".to_string(),
            ));
        }

        // 9. Scout 거부권
        Ok(check_scout_veto(input.entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trader_core::{RiskTag, SectorGroup};

    fn scanner_cfg() -> ScannerConfig {
        trader_core::AppConfig::from_env().unwrap().scanner
    }

    fn entry(tier: TradeTier, tradable: bool) -> WatchlistEntry {
        WatchlistEntry {
            stock_code: StockCode::new("005930").unwrap(),
            stock_name: "삼성전자".to_string(),
            hybrid_score: 78.0,
            llm_score: 72.0,
            is_tradable: tradable,
            trade_tier: tier,
            risk_tag: RiskTag::Neutral,
            rank: 1,
            sector_group: Some(SectorGroup::SemiconductorIt),
            veto_applied: false,
            scored_at: None,
        }
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn no_trade_window_blocks_opening_minutes() {
        let cfg = scanner_cfg();
        assert!(!check_windows(&cfg, time(9, 0)).passed());
        assert!(!check_windows(&cfg, time(9, 14)).passed());
        assert!(check_windows(&cfg, time(9, 15)).passed());
    }

    #[test]
    fn danger_zone_blocks_late_session() {
        let cfg = scanner_cfg();
        assert!(!check_windows(&cfg, time(14, 0)).passed());
        assert!(!check_windows(&cfg, time(14, 59)).passed());
        assert!(check_windows(&cfg, time(15, 0)).passed());
        assert!(check_windows(&cfg, time(13, 59)).passed());
    }

    #[test]
    fn rsi_guard_boundary_exact_75_rejected_in_sideways() {
        let cfg = scanner_cfg();
        let out = check_rsi_guard(
            &cfg,
            SignalType::GoldenCross,
            MarketRegime::Sideways,
            Some(75.0),
        );
        assert!(!out.passed());

        let out = check_rsi_guard(
            &cfg,
            SignalType::GoldenCross,
            MarketRegime::Sideways,
            Some(74.99),
        );
        assert!(out.passed());
    }

    #[test]
    fn rsi_guard_boundary_85_in_bull() {
        let cfg = scanner_cfg();
        assert!(!check_rsi_guard(
            &cfg,
            SignalType::GoldenCross,
            MarketRegime::Bull,
            Some(85.0)
        )
        .passed());
        assert!(check_rsi_guard(
            &cfg,
            SignalType::GoldenCross,
            MarketRegime::Bull,
            Some(84.99)
        )
        .passed());
    }

    #[test]
    fn rsi_guard_partial_bypass() {
        let cfg = scanner_cfg();
        for st in [
            SignalType::MomentumContinuation,
            SignalType::WatchlistConviction,
            SignalType::OrbBreakout,
        ] {
            assert!(check_rsi_guard(&cfg, st, MarketRegime::Sideways, Some(99.0)).passed());
        }
        assert!(!check_rsi_guard(
            &cfg,
            SignalType::Momentum,
            MarketRegime::Sideways,
            Some(99.0)
        )
        .passed());
    }

    #[test]
    fn vwap_deviation_guard() {
        let cfg = scanner_cfg();
        // 2% 한도 — 102 초과만 거부
        assert!(check_vwap_deviation(&cfg, 102.0, 100.0).passed());
        assert!(!check_vwap_deviation(&cfg, 102.01, 100.0).passed());
        // VWAP 미형성 시 통과
        assert!(check_vwap_deviation(&cfg, 500.0, 0.0).passed());
    }

    #[test]
    fn signal_cooldown_gate() {
        let cfg = scanner_cfg();
        assert!(check_signal_cooldown(&cfg, None).passed());
        assert!(!check_signal_cooldown(&cfg, Some(599)).passed());
        assert!(check_signal_cooldown(&cfg, Some(600)).passed());
    }

    #[test]
    fn scout_veto_gate() {
        assert!(!check_scout_veto(&entry(TradeTier::Blocked, false)).passed());
        assert!(!check_scout_veto(&entry(TradeTier::Tier1, false)).passed());
        assert!(check_scout_veto(&entry(TradeTier::Tier1, true)).passed());
    }
}
