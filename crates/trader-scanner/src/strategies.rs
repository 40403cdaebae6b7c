//! 매수 전략 감지.
//!
//! 각 전략은 (봉 링, 컨텍스트, 워치리스트 엔트리)에서 Option<Detection>을
//! 내는 순수 술어입니다. 국면 게이팅:
//!
//! | 전략 | 활성 국면 |
//! |---|---|
//! | GOLDEN_CROSS | BULL, STRONG_BULL, SIDEWAYS |
//! | RSI_REBOUND | SIDEWAYS, BEAR |
//! | MOMENTUM | 전체 |
//! | MOMENTUM_CONTINUATION | BULL, STRONG_BULL (09:15–10:30) |
//! | DIP_BUY | 국면별 범위 |
//! | VOLUME_BREAKOUT | 전체 |
//! | WATCHLIST_CONVICTION | 플래그 (기본 off) |
//! | ORB_BREAKOUT | 플래그 (기본 off) |

use chrono::NaiveTime;

use trader_core::config::ScannerConfig;
use trader_core::indicators::{rsi, sma};
use trader_core::time::{parse_hhmm, within_window};
use trader_core::{MarketRegime, MinuteBar, SignalType, WatchlistEntry};

/// 전략 입력 — 워커가 봉 링에서 구성.
pub struct StrategyInput<'a> {
    pub bars: &'a [MinuteBar],
    pub current_price: f64,
    pub rsi: Option<f64>,
    pub volume_ratio: f64,
    pub vwap: f64,
    /// 당일 첫 봉 시가
    pub intraday_open: Option<f64>,
    /// 당일 완성 봉 고가
    pub intraday_high: Option<f64>,
    /// 09:00~09:15 시가 범위 고가 (ORB)
    pub opening_range_high: Option<f64>,
    pub now_kst: NaiveTime,
    pub regime: MarketRegime,
    pub entry: &'a WatchlistEntry,
}

/// 감지 결과.
#[derive(Debug, Clone)]
pub struct Detection {
    pub signal_type: SignalType,
    pub reason: String,
}

fn closes(bars: &[MinuteBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

fn intraday_gain_pct(input: &StrategyInput) -> Option<f64> {
    let open = input.intraday_open?;
    if open <= 0.0 {
        return None;
    }
    Some((input.current_price / open - 1.0) * 100.0)
}

/// GOLDEN_CROSS: 봉 마감에서 MA5가 MA20을 상향 돌파.
pub fn detect_golden_cross(input: &StrategyInput, config: &ScannerConfig) -> Option<Detection> {
    if !matches!(
        input.regime,
        MarketRegime::Bull | MarketRegime::StrongBull | MarketRegime::Sideways
    ) {
        return None;
    }
    if input.bars.len() < 21 {
        return None;
    }

    let closes = closes(input.bars);
    let ma5 = sma(&closes, 5)?;
    let ma20 = sma(&closes, 20)?;
    let prev = &closes[..closes.len() - 1];
    let prev_ma5 = sma(prev, 5)?;
    let prev_ma20 = sma(prev, 20)?;

    let crossed = prev_ma5 <= prev_ma20 && ma5 > ma20;
    if !crossed || input.volume_ratio < config.golden_cross_min_volume_ratio {
        return None;
    }

    Some(Detection {
        signal_type: SignalType::GoldenCross,
        reason: format!(
            "MA5 {:.0} > MA20 {:.0} 상향 돌파, vol {:.1}x",
            ma5, ma20, input.volume_ratio
        ),
    })
}

/// RSI_REBOUND: RSI가 30을 찍고 35 위로 반등.
pub fn detect_rsi_rebound(input: &StrategyInput) -> Option<Detection> {
    if !matches!(input.regime, MarketRegime::Sideways | MarketRegime::Bear) {
        return None;
    }
    if input.bars.len() < 16 {
        return None;
    }

    let closes = closes(input.bars);
    let curr_rsi = rsi(&closes, 14)?;
    let prev_rsi = rsi(&closes[..closes.len() - 1], 14)?;

    if prev_rsi < 30.0 && curr_rsi >= 35.0 {
        return Some(Detection {
            signal_type: SignalType::RsiRebound,
            reason: format!("RSI 반등 {:.1} → {:.1}", prev_rsi, curr_rsi),
        });
    }
    None
}

/// MOMENTUM: 장중 상승 (0, cap] + 거래량 비율.
pub fn detect_momentum(input: &StrategyInput, config: &ScannerConfig) -> Option<Detection> {
    let gain = intraday_gain_pct(input)?;

    if gain < config.momentum_min_gain_pct {
        return None;
    }
    // 추격매수 방지 상한
    if gain > config.momentum_max_gain_pct {
        return None;
    }
    if input.volume_ratio < config.momentum_min_volume_ratio {
        return None;
    }

    Some(Detection {
        signal_type: SignalType::Momentum,
        reason: format!("장중 +{:.1}%, vol {:.1}x", gain, input.volume_ratio),
    })
}

/// MOMENTUM_CONTINUATION: Bull 국면 09:15–10:30, 장중 2~5%, RSI<75.
pub fn detect_momentum_continuation(
    input: &StrategyInput,
    config: &ScannerConfig,
) -> Option<Detection> {
    if !input.regime.is_bull() {
        return None;
    }
    let window_start = parse_hhmm(&config.continuation_window_start)?;
    let window_end = parse_hhmm(&config.continuation_window_end)?;
    if !within_window(input.now_kst, window_start, window_end) {
        return None;
    }
    if input.bars.len() < 21 {
        return None;
    }

    let gain = intraday_gain_pct(input)?;
    if !(2.0..=5.0).contains(&gain) {
        return None;
    }
    if input.rsi.is_some_and(|r| r >= 75.0) {
        return None;
    }

    // 추세 정렬 확인 — MA5 > MA20
    let closes = closes(input.bars);
    let ma5 = sma(&closes, 5)?;
    let ma20 = sma(&closes, 20)?;
    if ma5 <= ma20 {
        return None;
    }
    if input.entry.llm_score < 65.0 {
        return None;
    }

    Some(Detection {
        signal_type: SignalType::MomentumContinuation,
        reason: format!(
            "모멘텀 연속 +{:.1}%, MA5>MA20, LLM {:.0}",
            gain, input.entry.llm_score
        ),
    })
}

/// DIP_BUY: 장중 조정 구간 매수 — BULL −0.5~−3%, 그 외 −2~−5%.
pub fn detect_dip_buy(input: &StrategyInput) -> Option<Detection> {
    if input.bars.len() < 5 {
        return None;
    }
    let gain = intraday_gain_pct(input)?;

    let (min_dip, max_dip) = if input.regime.is_bull() {
        (-3.0, -0.5)
    } else {
        (-5.0, -2.0)
    };

    if gain >= min_dip && gain <= max_dip {
        return Some(Detection {
            signal_type: SignalType::DipBuy,
            reason: format!("눌림목 {:.1}% (범위 [{:.1}, {:.1}])", gain, min_dip, max_dip),
        });
    }
    None
}

/// VOLUME_BREAKOUT: 거래량 3배 + 장중 신고가.
pub fn detect_volume_breakout(input: &StrategyInput, config: &ScannerConfig) -> Option<Detection> {
    if input.bars.len() < 20 {
        return None;
    }
    if input.volume_ratio < config.volume_breakout_ratio {
        return None;
    }
    let high = input.intraday_high?;
    if input.current_price <= high {
        return None;
    }

    Some(Detection {
        signal_type: SignalType::VolumeBreakout,
        reason: format!(
            "거래량 돌파 {:.1}x, 신고가 {:.0}",
            input.volume_ratio, input.current_price
        ),
    })
}

/// WATCHLIST_CONVICTION: Scout 고확신 종목 장 초반 선제 진입 (플래그).
pub fn detect_conviction(input: &StrategyInput, config: &ScannerConfig) -> Option<Detection> {
    if !config.conviction_entry_enabled {
        return None;
    }
    if input.regime.is_bear() {
        return None;
    }
    if input.regime == MarketRegime::Sideways && input.entry.hybrid_score < 75.0 {
        return None;
    }

    let has_hybrid = input.entry.hybrid_score >= config.conviction_min_hybrid_score;
    let has_llm = input.entry.llm_score >= config.conviction_min_llm_score;
    if !(has_hybrid || has_llm) {
        return None;
    }

    let window_start = parse_hhmm(&config.conviction_window_start)?;
    let window_end = parse_hhmm(&config.conviction_window_end)?;
    if !within_window(input.now_kst, window_start, window_end) {
        return None;
    }

    // 과열 진입 방지
    if intraday_gain_pct(input).is_some_and(|g| g >= 3.0) {
        return None;
    }
    if input.vwap > 0.0 && (input.current_price / input.vwap - 1.0).abs() * 100.0 > 1.5 {
        return None;
    }
    if input.rsi.is_some_and(|r| r >= 65.0) {
        return None;
    }

    Some(Detection {
        signal_type: SignalType::WatchlistConviction,
        reason: format!(
            "고확신 진입 hybrid {:.0} / llm {:.0}",
            input.entry.hybrid_score, input.entry.llm_score
        ),
    })
}

/// ORB_BREAKOUT: 09:00–09:15 시가 범위를 09:15–10:30에 돌파 (플래그).
pub fn detect_orb_breakout(input: &StrategyInput, config: &ScannerConfig) -> Option<Detection> {
    if !config.orb_enabled {
        return None;
    }
    let range_end = parse_hhmm(&config.orb_range_end)?;
    let breakout_end = parse_hhmm(&config.orb_breakout_end)?;
    if !within_window(input.now_kst, range_end, breakout_end) {
        return None;
    }

    let range_high = input.opening_range_high?;
    if input.current_price <= range_high {
        return None;
    }

    Some(Detection {
        signal_type: SignalType::OrbBreakout,
        reason: format!(
            "시가 범위 {:.0} 돌파 → {:.0}",
            range_high, input.current_price
        ),
    })
}

/// 전략 순차 감지 — 첫 매칭 반환.
pub fn detect(input: &StrategyInput, config: &ScannerConfig) -> Option<Detection> {
    // 1. 고확신 선제 진입
    if let Some(d) = detect_conviction(input, config) {
        return Some(d);
    }

    // 2. Bull 계열
    if let Some(d) = detect_golden_cross(input, config) {
        return Some(d);
    }
    if let Some(d) = detect_momentum_continuation(input, config) {
        return Some(d);
    }

    // 3. 일반
    if let Some(d) = detect_momentum(input, config) {
        return Some(d);
    }
    if let Some(d) = detect_dip_buy(input) {
        return Some(d);
    }

    // 4. 역추세 / 돌파
    if let Some(d) = detect_rsi_rebound(input) {
        return Some(d);
    }
    if let Some(d) = detect_volume_breakout(input, config) {
        return Some(d);
    }
    detect_orb_breakout(input, config)
}
