//! 틱 → 1분봉 집계 + 세션 VWAP.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;

use trader_core::time::kst_offset;
use trader_core::{MinuteBar, PriceTick, StockCode};

/// 링 크기 — 최근 120개 1분봉.
const MAX_HISTORY: usize = 120;

/// 거래량 비율 기준 — 최근 20봉 평균.
const VOLUME_MEAN_BARS: usize = 20;

#[derive(Debug)]
struct CurrentBar {
    minute_ts: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

#[derive(Debug, Default)]
struct VwapState {
    cum_pv: f64,
    cum_vol: i64,
    vwap: f64,
    /// KST 날짜 — 바뀌면 리셋
    date: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct CodeState {
    current: Option<CurrentBar>,
    completed: VecDeque<MinuteBar>,
    vwap: VwapState,
}

/// 거래량 정보.
#[derive(Debug, Clone, Copy)]
pub struct VolumeInfo {
    pub current: i64,
    pub average: f64,
    pub ratio: f64,
}

/// 코드별 1분봉 링 + VWAP 엔진.
///
/// 워커 로컬 소유 — 동기화 없음. 같은 코드의 틱은 항상 같은 워커로
/// 라우팅되어 분봉 슬롯 갱신이 직렬화됩니다.
#[derive(Debug, Default)]
pub struct BarEngine {
    state: HashMap<StockCode, CodeState>,
}

impl BarEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 틱 반영. 분이 넘어가며 봉이 닫히면 닫힌 봉을 반환.
    pub fn update(&mut self, tick: &PriceTick) -> Option<MinuteBar> {
        let price = tick.price.to_f64()?;
        let minute_ts = minute_slot(tick.timestamp);
        let state = self.state.entry(tick.stock_code.clone()).or_default();

        // 세션 VWAP (KST 날짜 단위 리셋)
        let kst_date = tick.timestamp.with_timezone(&kst_offset()).date_naive();
        if state.vwap.date != Some(kst_date) {
            state.vwap = VwapState {
                date: Some(kst_date),
                ..VwapState::default()
            };
        }
        if tick.volume > 0 {
            state.vwap.cum_pv += price * tick.volume as f64;
            state.vwap.cum_vol += tick.volume;
            state.vwap.vwap = state.vwap.cum_pv / state.vwap.cum_vol as f64;
        }

        match &mut state.current {
            Some(current) if current.minute_ts == minute_ts => {
                current.high = current.high.max(price);
                current.low = current.low.min(price);
                current.close = price;
                current.volume += tick.volume;
                None
            }
            slot => {
                // 분 롤오버 — 이전 봉 동결
                let completed = slot.take().map(|c| MinuteBar {
                    minute_ts: c.minute_ts,
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                    volume: c.volume,
                });
                *slot = Some(CurrentBar {
                    minute_ts,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: tick.volume,
                });

                if let Some(bar) = &completed {
                    state.completed.push_back(bar.clone());
                    if state.completed.len() > MAX_HISTORY {
                        state.completed.pop_front();
                    }
                }
                completed
            }
        }
    }

    /// 최근 count개 완성 봉 (오래된 순).
    pub fn recent_bars(&self, code: &StockCode, count: usize) -> Vec<MinuteBar> {
        match self.state.get(code) {
            Some(state) => {
                let len = state.completed.len();
                state
                    .completed
                    .iter()
                    .skip(len.saturating_sub(count))
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        }
    }

    pub fn bar_count(&self, code: &StockCode) -> usize {
        self.state.get(code).map_or(0, |s| s.completed.len())
    }

    /// 세션 VWAP. 거래량 없으면 0.
    pub fn vwap(&self, code: &StockCode) -> f64 {
        self.state.get(code).map_or(0.0, |s| s.vwap.vwap)
    }

    /// 현재 진행 봉 거래량 vs 최근 20봉 평균.
    pub fn volume_info(&self, code: &StockCode) -> VolumeInfo {
        let Some(state) = self.state.get(code) else {
            return VolumeInfo {
                current: 0,
                average: 0.0,
                ratio: 0.0,
            };
        };
        let current = state.current.as_ref().map_or(0, |c| c.volume);
        let len = state.completed.len();
        let recent: Vec<i64> = state
            .completed
            .iter()
            .skip(len.saturating_sub(VOLUME_MEAN_BARS))
            .map(|b| b.volume)
            .collect();
        let average = if recent.is_empty() {
            0.0
        } else {
            recent.iter().sum::<i64>() as f64 / recent.len() as f64
        };
        let ratio = if average > 0.0 {
            current as f64 / average
        } else {
            0.0
        };
        VolumeInfo {
            current,
            average,
            ratio,
        }
    }

    /// 당일(KST) 첫 봉 시가.
    pub fn intraday_open(&self, code: &StockCode, today: NaiveDate) -> Option<f64> {
        let state = self.state.get(code)?;
        state
            .completed
            .iter()
            .find(|b| bar_kst_date(b) == today)
            .map(|b| b.open)
            .or_else(|| {
                state
                    .current
                    .as_ref()
                    .filter(|c| slot_kst_date(c.minute_ts) == today)
                    .map(|c| c.open)
            })
    }

    /// 당일 완성 봉 기준 장중 고가.
    pub fn intraday_high(&self, code: &StockCode, today: NaiveDate) -> Option<f64> {
        let state = self.state.get(code)?;
        state
            .completed
            .iter()
            .filter(|b| bar_kst_date(b) == today)
            .map(|b| b.high)
            .fold(None, |acc, h| Some(acc.map_or(h, |a: f64| a.max(h))))
    }

    /// 시가 범위(09:00~range_end KST) 고가 — ORB 기준선.
    pub fn opening_range_high(
        &self,
        code: &StockCode,
        today: NaiveDate,
        range_end: chrono::NaiveTime,
    ) -> Option<f64> {
        let state = self.state.get(code)?;
        state
            .completed
            .iter()
            .filter(|b| {
                let kst = slot_kst(b.minute_ts);
                kst.date_naive() == today && kst.time() < range_end
            })
            .map(|b| b.high)
            .fold(None, |acc, h| Some(acc.map_or(h, |a: f64| a.max(h))))
    }
}

fn minute_slot(ts: DateTime<Utc>) -> i64 {
    (ts.timestamp() / 60) * 60
}

fn slot_kst(minute_ts: i64) -> DateTime<chrono::FixedOffset> {
    DateTime::from_timestamp(minute_ts, 0)
        .unwrap_or_default()
        .with_timezone(&kst_offset())
}

fn slot_kst_date(minute_ts: i64) -> NaiveDate {
    slot_kst(minute_ts).date_naive()
}

fn bar_kst_date(bar: &MinuteBar) -> NaiveDate {
    slot_kst_date(bar.minute_ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn tick(code: &str, price: rust_decimal::Decimal, volume: i64, secs: i64) -> PriceTick {
        PriceTick {
            stock_code: StockCode::new(code).unwrap(),
            price,
            volume,
            // 2025-07-01 09:30 KST = 00:30 UTC
            timestamp: Utc.with_ymd_and_hms(2025, 7, 1, 0, 30, 0).unwrap()
                + chrono::Duration::seconds(secs),
        }
    }

    #[test]
    fn single_minute_updates_one_slot() {
        let mut engine = BarEngine::new();
        let code = StockCode::new("005930").unwrap();

        // 같은 분 내 3틱 — 봉 완성 없음
        assert!(engine.update(&tick("005930", dec!(100), 10, 0)).is_none());
        assert!(engine.update(&tick("005930", dec!(105), 10, 20)).is_none());
        assert!(engine.update(&tick("005930", dec!(98), 10, 59)).is_none());
        assert_eq!(engine.bar_count(&code), 0);

        // 분 롤오버 — 이전 봉 동결
        let completed = engine.update(&tick("005930", dec!(102), 5, 60)).unwrap();
        assert_eq!(completed.open, 100.0);
        assert_eq!(completed.high, 105.0);
        assert_eq!(completed.low, 98.0);
        assert_eq!(completed.close, 98.0);
        assert_eq!(completed.volume, 30);
        assert_eq!(engine.bar_count(&code), 1);
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let mut engine = BarEngine::new();
        let code = StockCode::new("005930").unwrap();
        for i in 0..130 {
            engine.update(&tick("005930", dec!(100), 1, i * 60));
        }
        // 130분 경과 → 완성 봉 129개 중 최근 120개 유지
        assert_eq!(engine.bar_count(&code), MAX_HISTORY);
        let bars = engine.recent_bars(&code, 200);
        assert_eq!(bars.len(), MAX_HISTORY);
    }

    #[test]
    fn vwap_accumulates_within_session() {
        let mut engine = BarEngine::new();
        let code = StockCode::new("005930").unwrap();
        engine.update(&tick("005930", dec!(100), 100, 0));
        engine.update(&tick("005930", dec!(110), 100, 10));
        // (100*100 + 110*100) / 200 = 105
        assert!((engine.vwap(&code) - 105.0).abs() < 1e-9);
    }

    #[test]
    fn volume_ratio_against_recent_mean() {
        let mut engine = BarEngine::new();
        let code = StockCode::new("005930").unwrap();
        // 10개 봉, 봉당 거래량 100
        for i in 0..10 {
            engine.update(&tick("005930", dec!(100), 100, i * 60));
        }
        // 현재 봉에 300 유입
        engine.update(&tick("005930", dec!(100), 300, 10 * 60));
        let info = engine.volume_info(&code);
        assert_eq!(info.current, 300);
        assert!((info.average - 100.0).abs() < 1.0);
        assert!(info.ratio > 2.9);
    }
}
