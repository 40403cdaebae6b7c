//! 전략 감지 통합 테스트.
//!
//! 봉 시퀀스를 직접 구성해 감지/미감지 경계를 검증합니다.

use chrono::NaiveTime;
use trader_core::{
    AppConfig, MarketRegime, MinuteBar, RiskTag, SectorGroup, SignalType, StockCode, TradeTier,
    WatchlistEntry,
};
use trader_scanner::strategies::{detect, StrategyInput};

fn entry(hybrid: f64, llm: f64, tier: TradeTier) -> WatchlistEntry {
    WatchlistEntry {
        stock_code: StockCode::new("005930").unwrap(),
        stock_name: "삼성전자".to_string(),
        hybrid_score: hybrid,
        llm_score: llm,
        is_tradable: tier != TradeTier::Blocked,
        trade_tier: tier,
        risk_tag: RiskTag::Neutral,
        rank: 1,
        sector_group: Some(SectorGroup::SemiconductorIt),
        veto_applied: false,
        scored_at: None,
    }
}

/// 종가 수열로 봉 시퀀스 생성.
fn bars_from_closes(closes: &[f64]) -> Vec<MinuteBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| MinuteBar {
            minute_ts: 1_751_330_000 + (i as i64) * 60,
            open: close,
            high: close + 10.0,
            low: close - 10.0,
            close,
            volume: 1_000,
        })
        .collect()
}

/// 마지막 봉에서 MA5가 MA20을 상향 돌파하는 수열.
///
/// 횡보(MA5 == MA20) 후 마지막 봉 급등 — 직전 봉까지는 prev_ma5 <= prev_ma20.
fn golden_cross_closes() -> Vec<f64> {
    let mut closes = vec![10_000.0; 25];
    closes.push(10_500.0);
    closes
}

/// 단조 상승 수열 — 교차 없이 장중 모멘텀만 형성.
fn rising_closes(step: f64) -> Vec<f64> {
    (0..26).map(|i| 10_000.0 + (i as f64) * step).collect()
}

fn input<'a>(
    bars: &'a [MinuteBar],
    entry: &'a WatchlistEntry,
    regime: MarketRegime,
    volume_ratio: f64,
) -> StrategyInput<'a> {
    let price = bars.last().map(|b| b.close).unwrap_or(0.0);
    StrategyInput {
        bars,
        current_price: price,
        rsi: Some(55.0),
        volume_ratio,
        vwap: price * 0.995,
        intraday_open: bars.first().map(|b| b.open),
        intraday_high: bars.iter().map(|b| b.high).fold(None, |acc, h| {
            Some(acc.map_or(h, |a: f64| a.max(h)))
        }),
        opening_range_high: None,
        now_kst: NaiveTime::from_hms_opt(9, 40, 0).unwrap(),
        regime,
        entry,
    }
}

#[test]
fn golden_cross_detected_in_bull_with_volume() {
    let config = AppConfig::from_env().unwrap().scanner;
    let bars = bars_from_closes(&golden_cross_closes());
    let watch = entry(78.0, 72.0, TradeTier::Tier1);

    let detection = detect(&input(&bars, &watch, MarketRegime::Bull, 2.0), &config)
        .expect("골든크로스 감지 실패");
    assert_eq!(detection.signal_type, SignalType::GoldenCross);
}

#[test]
fn golden_cross_suppressed_without_volume() {
    let config = AppConfig::from_env().unwrap().scanner;
    let bars = bars_from_closes(&golden_cross_closes());
    let watch = entry(78.0, 72.0, TradeTier::Tier1);

    // 거래량 비율 미달 — 골든크로스 조건 자체가 무효.
    // 반등 수열의 장중 변동이 다른 전략 범위 밖이어야 완전 무감지.
    let detection = detect(&input(&bars, &watch, MarketRegime::Bull, 0.5), &config);
    if let Some(d) = detection {
        assert_ne!(d.signal_type, SignalType::GoldenCross);
    }
}

#[test]
fn golden_cross_inactive_in_bear() {
    let config = AppConfig::from_env().unwrap().scanner;
    let bars = bars_from_closes(&golden_cross_closes());
    let watch = entry(78.0, 72.0, TradeTier::Tier1);

    let detection = detect(&input(&bars, &watch, MarketRegime::Bear, 2.0), &config);
    if let Some(d) = detection {
        assert_ne!(d.signal_type, SignalType::GoldenCross);
    }
}

#[test]
fn momentum_capped_against_chasing() {
    let config = AppConfig::from_env().unwrap().scanner;
    let watch = entry(78.0, 72.0, TradeTier::Tier1);

    // 장중 +8% — momentum_max_gain_pct(7%) 초과 → 추격매수 방지.
    // 단조 상승이라 골든크로스는 형성되지 않음.
    let bars = bars_from_closes(&rising_closes(32.0));
    let mut strat_input = input(&bars, &watch, MarketRegime::Sideways, 2.0);
    strat_input.intraday_open = Some(10_000.0);
    strat_input.current_price = 10_800.0;

    let detection = detect(&strat_input, &config);
    if let Some(d) = detection {
        assert_ne!(d.signal_type, SignalType::Momentum);
    }
}

#[test]
fn momentum_in_band_detected() {
    let config = AppConfig::from_env().unwrap().scanner;
    let watch = entry(78.0, 72.0, TradeTier::Tier1);

    // 장중 +3%, 거래량 2배 — (0, 7%] 구간. 단조 상승이라 교차 없음.
    let bars = bars_from_closes(&rising_closes(12.0));
    let mut strat_input = input(&bars, &watch, MarketRegime::Sideways, 2.0);
    strat_input.intraday_open = Some(10_000.0);
    strat_input.current_price = 10_300.0;

    let detection = detect(&strat_input, &config).expect("모멘텀 감지 실패");
    assert_eq!(detection.signal_type, SignalType::Momentum);
}

#[test]
fn dip_buy_band_is_regime_parameterized() {
    let config = AppConfig::from_env().unwrap().scanner;
    let watch = entry(78.0, 72.0, TradeTier::Tier1);

    // 장중 -1.5%: BULL 범위 [-3, -0.5]에는 들고, BEAR 범위 [-5, -2]에는 안 듦.
    // 단조 하락 — 교차/모멘텀 비형성.
    let closes: Vec<f64> = (0..26).map(|i| 10_000.0 - (i as f64) * 6.0).collect();
    let bars = bars_from_closes(&closes);

    let mut bull_input = input(&bars, &watch, MarketRegime::Bull, 1.0);
    bull_input.intraday_open = Some(10_000.0);
    bull_input.current_price = 9_850.0;
    let detection = detect(&bull_input, &config).expect("BULL 눌림목 감지 실패");
    assert_eq!(detection.signal_type, SignalType::DipBuy);

    let mut bear_input = input(&bars, &watch, MarketRegime::Bear, 1.0);
    bear_input.intraday_open = Some(10_000.0);
    bear_input.current_price = 9_850.0;
    let detection = detect(&bear_input, &config);
    if let Some(d) = detection {
        assert_ne!(d.signal_type, SignalType::DipBuy);
    }
}

#[test]
fn conviction_disabled_by_default() {
    let config = AppConfig::from_env().unwrap().scanner;
    assert!(!config.conviction_entry_enabled);

    // 고확신 조건을 모두 충족해도 플래그 off면 미발동
    let closes: Vec<f64> = vec![10_000.0; 26];
    let bars = bars_from_closes(&closes);
    let watch = entry(90.0, 90.0, TradeTier::Tier1);
    let strat_input = input(&bars, &watch, MarketRegime::Bull, 1.0);

    let detection = detect(&strat_input, &config);
    if let Some(d) = detection {
        assert_ne!(d.signal_type, SignalType::WatchlistConviction);
    }
}

#[test]
fn volume_breakout_requires_new_high() {
    let config = AppConfig::from_env().unwrap().scanner;
    let watch = entry(78.0, 72.0, TradeTier::Tier1);

    let closes: Vec<f64> = vec![10_000.0; 25];
    let bars = bars_from_closes(&closes);

    // 거래량 3배 + 신고가 돌파 (고가 10,010 초과)
    let mut strat_input = input(&bars, &watch, MarketRegime::Sideways, 3.5);
    strat_input.current_price = 10_050.0;
    strat_input.intraday_open = Some(10_000.0);
    strat_input.intraday_high = Some(10_010.0);
    let detection = detect(&strat_input, &config).expect("거래량 돌파 감지 실패");
    assert_eq!(detection.signal_type, SignalType::VolumeBreakout);

    // 신고가 아님 → 미발동
    let mut strat_input = input(&bars, &watch, MarketRegime::Sideways, 3.5);
    strat_input.current_price = 10_000.0;
    strat_input.intraday_open = Some(10_000.0);
    strat_input.intraday_high = Some(10_010.0);
    let detection = detect(&strat_input, &config);
    if let Some(d) = detection {
        assert_ne!(d.signal_type, SignalType::VolumeBreakout);
    }
}

#[test]
fn orb_breakout_flag_gated_and_windowed() {
    let mut config = AppConfig::from_env().unwrap().scanner;
    let watch = entry(78.0, 72.0, TradeTier::Tier1);
    let closes: Vec<f64> = vec![10_000.0; 25];
    let bars = bars_from_closes(&closes);

    let mut strat_input = input(&bars, &watch, MarketRegime::Sideways, 1.0);
    strat_input.opening_range_high = Some(10_020.0);
    strat_input.current_price = 10_050.0;

    // 플래그 off → 미발동
    let detection = detect(&strat_input, &config);
    if let Some(d) = detection {
        assert_ne!(d.signal_type, SignalType::OrbBreakout);
    }

    // 플래그 on + 돌파 창(09:40) → 발동
    config.orb_enabled = true;
    let detection = detect(&strat_input, &config).expect("ORB 감지 실패");
    assert_eq!(detection.signal_type, SignalType::OrbBreakout);

    // 돌파 창 밖(11:00) → 미발동
    strat_input.now_kst = NaiveTime::from_hms_opt(11, 0, 0).unwrap();
    let detection = detect(&strat_input, &config);
    if let Some(d) = detection {
        assert_ne!(d.signal_type, SignalType::OrbBreakout);
    }
}
