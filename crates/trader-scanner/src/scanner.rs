//! 스캐너 워커 — 틱 처리 파이프라인.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use trader_core::config::{RiskConfig, ScannerConfig};
use trader_core::time::{kst_now, parse_hhmm};
use trader_core::{
    BuySignal, HotWatchlist, PriceTick, RiskTag, StockCode, TradeTier, TradingContext,
    WatchlistEntry,
};
use trader_fabric::{FabricError, TypedStreamPublisher};

use crate::bars::BarEngine;
use crate::gates::{GateInput, GateOutcome, RiskGates};
use crate::strategies::{detect, Detection, StrategyInput};

/// 워커 간 공유 상태 — 리로더 태스크가 갱신.
pub struct ScannerShared {
    pub watchlist: RwLock<Option<HotWatchlist>>,
    /// 운영자 수동 고정 종목 {code → 최소 점수}
    pub manual: RwLock<HashMap<String, f64>>,
    pub context: RwLock<TradingContext>,
}

impl ScannerShared {
    pub fn new(fallback_context: TradingContext) -> Self {
        Self {
            watchlist: RwLock::new(None),
            manual: RwLock::new(HashMap::new()),
            context: RwLock::new(fallback_context),
        }
    }
}

/// 모멘텀 확인 대기 상태 — 다음 봉 마감까지 가격 유지 확인.
struct PendingMomentum {
    detection: Detection,
    initial_price: f64,
    bars_waited: u32,
    rsi: Option<f64>,
    volume_ratio: f64,
    vwap: f64,
}

/// 코드 해시로 고정 배정되는 단일 워커.
pub struct ScannerWorker {
    worker_id: usize,
    engine: BarEngine,
    last_signal: HashMap<StockCode, Instant>,
    pending_momentum: HashMap<StockCode, PendingMomentum>,
    shared: Arc<ScannerShared>,
    gates: RiskGates,
    publisher: TypedStreamPublisher<BuySignal>,
    scanner_cfg: ScannerConfig,
    risk_cfg: RiskConfig,
}

impl ScannerWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: usize,
        shared: Arc<ScannerShared>,
        gates: RiskGates,
        publisher: TypedStreamPublisher<BuySignal>,
        scanner_cfg: ScannerConfig,
        risk_cfg: RiskConfig,
    ) -> Self {
        Self {
            worker_id,
            engine: BarEngine::new(),
            last_signal: HashMap::new(),
            pending_momentum: HashMap::new(),
            shared,
            gates,
            publisher,
            scanner_cfg,
            risk_cfg,
        }
    }

    /// 틱 하나 처리. 봉 마감 시에만 전략을 평가합니다.
    pub async fn process_tick(&mut self, tick: PriceTick) {
        if let Err(e) = tick.validate() {
            debug!(error = %e, "틱 검증 실패 — 폐기");
            return;
        }

        let entry = match self.resolve_entry(&tick.stock_code).await {
            Some(entry) => entry,
            None => return, // 감시 대상 아님
        };

        let completed = self.engine.update(&tick);
        if completed.is_none() {
            return;
        }

        // 모멘텀 확인 봉 대기 중이면 확정/폐기만 수행
        if self.pending_momentum.contains_key(&tick.stock_code) {
            self.settle_pending(&tick, &entry).await;
            return;
        }

        if self.engine.bar_count(&tick.stock_code) < self.scanner_cfg.min_required_bars {
            return;
        }

        let context = self.shared.context.read().await.clone();
        let regime = context.market_regime;
        let now = kst_now();
        let today = now.date_naive();

        let bars = self.engine.recent_bars(&tick.stock_code, 120);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let rsi = trader_core::indicators::rsi(&closes, 14);
        let volume_info = self.engine.volume_info(&tick.stock_code);
        let vwap = self.engine.vwap(&tick.stock_code);
        let current_price = match tick.price.to_f64() {
            Some(p) => p,
            None => return,
        };

        let orb_range_end = parse_hhmm(&self.scanner_cfg.orb_range_end)
            .unwrap_or_else(|| chrono::NaiveTime::from_hms_opt(9, 15, 0).unwrap());

        let input = StrategyInput {
            bars: &bars,
            current_price,
            rsi,
            volume_ratio: volume_info.ratio,
            vwap,
            intraday_open: self.engine.intraday_open(&tick.stock_code, today),
            intraday_high: self.engine.intraday_high(&tick.stock_code, today),
            opening_range_high: self
                .engine
                .opening_range_high(&tick.stock_code, today, orb_range_end),
            now_kst: now.time(),
            regime,
            entry: &entry,
        };

        let Some(detection) = detect(&input, &self.scanner_cfg) else {
            return;
        };

        // 리스크 게이트 (전략 인지 — RSI 부분 우회)
        let gate_input = GateInput {
            signal_type: detection.signal_type,
            entry: &entry,
            regime,
            now_kst: now.time(),
            rsi,
            current_price,
            vwap,
            secs_since_last_signal: self
                .last_signal
                .get(&tick.stock_code)
                .map(|t| t.elapsed().as_secs()),
        };
        match self
            .gates
            .check_all(&tick.stock_code, &gate_input, &self.scanner_cfg, &self.risk_cfg)
            .await
        {
            Ok(GateOutcome::Pass) => {}
            Ok(GateOutcome::Fail { gate, reason }) => {
                info!(
                    stock_code = %tick.stock_code,
                    signal_type = %detection.signal_type,
                    gate = gate,
                    reason = %reason,
                    "게이트 거부"
                );
                return;
            }
            Err(e) => {
                warn!(stock_code = %tick.stock_code, error = %e, "게이트 평가 실패");
                return;
            }
        }

        // 모멘텀 계열은 확인 봉 대기
        if self.scanner_cfg.momentum_confirmation_bars > 0
            && detection.signal_type.is_momentum_family()
        {
            info!(
                stock_code = %tick.stock_code,
                signal_type = %detection.signal_type,
                price = current_price,
                "모멘텀 확인 대기"
            );
            self.pending_momentum.insert(
                tick.stock_code.clone(),
                PendingMomentum {
                    detection,
                    initial_price: current_price,
                    bars_waited: 0,
                    rsi,
                    volume_ratio: volume_info.ratio,
                    vwap,
                },
            );
            return;
        }

        self.publish(&tick.stock_code, &entry, &detection, current_price, rsi, volume_info.ratio, vwap, &context)
            .await;
    }

    /// 확인 대기 중인 모멘텀 시그널 확정/폐기.
    async fn settle_pending(&mut self, tick: &PriceTick, entry: &WatchlistEntry) {
        let Some(current_price) = tick.price.to_f64() else {
            return;
        };
        let Some(mut pending) = self.pending_momentum.remove(&tick.stock_code) else {
            return;
        };
        pending.bars_waited += 1;

        if current_price >= pending.initial_price {
            let context = self.shared.context.read().await.clone();
            let detection = pending.detection.clone();
            self.publish(
                &tick.stock_code,
                entry,
                &detection,
                current_price,
                pending.rsi,
                pending.volume_ratio,
                pending.vwap,
                &context,
            )
            .await;
            return;
        }

        if pending.bars_waited < self.scanner_cfg.momentum_confirmation_bars {
            self.pending_momentum.insert(tick.stock_code.clone(), pending);
        } else {
            info!(
                stock_code = %tick.stock_code,
                initial = pending.initial_price,
                current = current_price,
                "모멘텀 확인 실패 — 폐기"
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn publish(
        &mut self,
        code: &StockCode,
        entry: &WatchlistEntry,
        detection: &Detection,
        price: f64,
        rsi: Option<f64>,
        volume_ratio: f64,
        vwap: f64,
        context: &TradingContext,
    ) {
        let signal = BuySignal {
            stock_code: code.clone(),
            stock_name: entry.stock_name.clone(),
            signal_type: detection.signal_type,
            signal_price: Decimal::from_f64(price).unwrap_or_default(),
            llm_score: entry.llm_score,
            hybrid_score: entry.hybrid_score,
            trade_tier: entry.trade_tier,
            risk_tag: entry.risk_tag,
            market_regime: context.market_regime,
            source: "scanner".to_string(),
            timestamp: Utc::now(),
            rsi_value: rsi,
            volume_ratio: Some(volume_ratio),
            vwap: (vwap > 0.0).then_some(vwap),
            sector_group: entry.sector_group,
            position_multiplier: context.clamped_position_multiplier(),
        };

        // 생성 시점 불변식 — BLOCKED는 발행 전 거부
        if let Err(e) = signal.validate() {
            warn!(stock_code = %code, error = %e, "시그널 불변식 위반 — 발행 취소");
            return;
        }

        match self.publisher.publish(&signal).await {
            Ok(_) => {
                self.last_signal.insert(code.clone(), Instant::now());
                info!(
                    worker = self.worker_id,
                    stock_code = %code,
                    signal_type = %detection.signal_type,
                    price = price,
                    hybrid_score = entry.hybrid_score,
                    reason = %detection.reason,
                    "매수 시그널 발행"
                );
            }
            Err(e) => warn!(stock_code = %code, error = %e, "시그널 발행 실패"),
        }
    }

    /// 워치리스트/수동 고정에서 엔트리 해석.
    async fn resolve_entry(&self, code: &StockCode) -> Option<WatchlistEntry> {
        {
            let watchlist = self.shared.watchlist.read().await;
            if let Some(wl) = watchlist.as_ref() {
                if let Some(entry) = wl.get_stock(code) {
                    if entry.validate().is_err() {
                        // 경계 재검증 실패 — 감시 대상에서 제외
                        return None;
                    }
                    return Some(entry.clone());
                }
            }
        }

        let manual = self.shared.manual.read().await;
        manual
            .get(code.as_str())
            .map(|&min_score| manual_entry(code, min_score))
    }

    /// 워커 상태 요약 (상태 로그용).
    pub fn status(&self) -> (usize, usize) {
        (self.last_signal.len(), self.pending_momentum.len())
    }
}

/// 수동 고정 종목의 합성 엔트리 — TIER2 취급.
fn manual_entry(code: &StockCode, min_score: f64) -> WatchlistEntry {
    WatchlistEntry {
        stock_code: code.clone(),
        stock_name: code.to_string(),
        hybrid_score: min_score,
        llm_score: min_score,
        is_tradable: true,
        trade_tier: TradeTier::Tier2,
        risk_tag: RiskTag::Neutral,
        rank: 99,
        sector_group: None,
        veto_applied: false,
        scored_at: None,
    }
}

/// 워치리스트 리로드 — 활성 워치리스트 ∪ 수동 고정.
///
/// 코드 집합이 바뀌면 변경분을 반환하여 호출자가 Gateway 구독을
/// 정렬하게 합니다.
pub async fn reload_watch_set(
    shared: &ScannerShared,
    watchlist_cache: &trader_fabric::TypedCache<HotWatchlist>,
    manual_key: &str,
    conn: &redis::aio::ConnectionManager,
) -> Result<Vec<StockCode>, FabricError> {
    let watchlist = watchlist_cache.get().await?;
    let manual = trader_fabric::cache::read_manual_overrides(conn, manual_key).await?;

    let mut codes: Vec<StockCode> = Vec::new();
    if let Some(wl) = &watchlist {
        codes.extend(wl.stock_codes());
    }
    for code_str in manual.keys() {
        if let Ok(code) = StockCode::new(code_str.as_str()) {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
    }

    if watchlist.is_some() {
        *shared.watchlist.write().await = watchlist;
    } else {
        warn!("활성 워치리스트 없음 — 기존 스냅샷 유지");
    }
    *shared.manual.write().await = manual;

    Ok(codes)
}
