//! 포지션 감시 엔진.
//!
//! - 틱 경로: 보유 코드 틱 → PositionContext 구성 → exit chain → SellOrder
//! - 대사 경로(30초): 증권사 잔고 ⊕ 로컬 메타 병합, 고아 메타 정리,
//!   `positions:live` 스냅샷 갱신, 보유 코드 구독

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use trader_core::config::SellConfig;
use trader_core::indicators::{clamp_atr, sma, OhlcBar};
use trader_core::{Position, PositionMeta, PriceTick, SellOrder, StockCode, TradingContext};
use trader_fabric::{keys, PositionStore, TypedCache, TypedStreamPublisher};
use trader_gateway::GatewayClient;

use crate::exit::{evaluate_exit, ExitDecision, PositionContext};

/// 지표 캐시 신선도 (초) — 일봉 기반이라 5분이면 충분.
const INDICATOR_TTL: Duration = Duration::from_secs(300);

/// `positions:live` 스냅샷 레코드.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsLive {
    pub positions: Vec<Position>,
    pub updated_at: DateTime<Utc>,
}

/// 일봉에서 파생한 포지션 지표 묶음.
#[derive(Debug, Clone)]
struct Indicators {
    atr: f64,
    rsi: Option<f64>,
    ma5: Option<f64>,
    ma20: Option<f64>,
    prev_ma5: Option<f64>,
    prev_ma20: Option<f64>,
    fetched_at: Instant,
}

pub struct PriceMonitor {
    gateway: GatewayClient,
    store: PositionStore,
    publisher: TypedStreamPublisher<SellOrder>,
    positions_live: TypedCache<PositionsLive>,
    context_cache: TypedCache<TradingContext>,
    sell_cfg: SellConfig,
    /// 증권사 잔고 ⊕ 메타 병합 뷰
    positions: RwLock<HashMap<StockCode, (Position, PositionMeta)>>,
    indicators: Mutex<HashMap<StockCode, Indicators>>,
}

impl PriceMonitor {
    pub fn new(
        gateway: GatewayClient,
        store: PositionStore,
        publisher: TypedStreamPublisher<SellOrder>,
        positions_live: TypedCache<PositionsLive>,
        context_cache: TypedCache<TradingContext>,
        sell_cfg: SellConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            store,
            publisher,
            positions_live,
            context_cache,
            sell_cfg,
            positions: RwLock::new(HashMap::new()),
            indicators: Mutex::new(HashMap::new()),
        })
    }

    /// 증권사 잔고와 로컬 메타 대사. 보유 코드 목록을 반환.
    ///
    /// - 증권사에 없는 코드의 메타는 제거 (수동 매도 등)
    /// - 메타 없는 신규 코드는 `high_watermark = 현재가`로 최소 생성
    pub async fn reconcile(&self) -> Result<Vec<StockCode>, ReconcileError> {
        let balance = self.gateway.balance().await.map_err(|e| {
            ReconcileError(format!("잔고 조회 실패: {}", e))
        })?;

        let mut merged: HashMap<StockCode, (Position, PositionMeta)> = HashMap::new();
        for position in &balance.positions {
            let code = position.stock_code.clone();
            let meta = match self.store.get(&code).await {
                Ok(Some(meta)) => meta,
                Ok(None) => {
                    // 실행기 외 경로로 생긴 포지션 — 최소 메타 생성
                    let current = position
                        .current_price
                        .unwrap_or(position.average_buy_price);
                    let meta = PositionMeta {
                        stock_code: code.clone(),
                        sector_group: None,
                        high_watermark: current,
                        stop_loss_price: Decimal::ZERO,
                        bought_at: Utc::now(),
                        scale_out_level: 0,
                        rsi_sold: false,
                    };
                    if let Err(e) = self.store.put(&meta).await {
                        warn!(stock_code = %code, error = %e, "신규 메타 저장 실패");
                    }
                    info!(stock_code = %code, "메타 없는 보유 종목 — 최소 메타 생성");
                    meta
                }
                Err(e) => {
                    warn!(stock_code = %code, error = %e, "메타 조회 실패 — 이번 사이클 건너뜀");
                    continue;
                }
            };
            let mut position = position.clone();
            position.sector_group = meta.sector_group;
            position.high_watermark = meta.high_watermark;
            position.stop_loss_price = meta.stop_loss_price;
            position.bought_at = Some(meta.bought_at);
            merged.insert(code, (position, meta));
        }

        // 증권사에서 사라진 코드의 로컬 상태 정리
        {
            let previous = self.positions.read().await;
            for code in previous.keys() {
                if !merged.contains_key(code) {
                    info!(stock_code = %code, "보유 해제 감지 — 로컬 메타 정리");
                    if let Err(e) = self.store.delete(code).await {
                        warn!(stock_code = %code, error = %e, "메타 삭제 실패");
                    }
                }
            }
        }

        let held: Vec<StockCode> = merged.keys().cloned().collect();
        let snapshot = PositionsLive {
            positions: merged.values().map(|(p, _)| p.clone()).collect(),
            updated_at: Utc::now(),
        };
        *self.positions.write().await = merged;

        if let Err(e) = self.positions_live.set(&snapshot).await {
            warn!(error = %e, "positions:live 갱신 실패");
        }

        debug!(count = held.len(), "포지션 대사 완료");
        Ok(held)
    }

    /// 틱 하나 평가. 보유 코드가 아니면 무시.
    pub async fn on_tick(&self, tick: &PriceTick) {
        if tick.validate().is_err() {
            return;
        }
        let Some(price) = tick.price.to_f64() else {
            return;
        };

        let (mut position, mut meta) = {
            let positions = self.positions.read().await;
            match positions.get(&tick.stock_code) {
                Some(pair) => pair.clone(),
                None => return,
            }
        };

        let buy = match position.average_buy_price.to_f64() {
            Some(b) if b > 0.0 => b,
            _ => return,
        };

        // 고점 갱신 — 기회적 영속화
        let hw = meta.high_watermark.to_f64().unwrap_or(buy).max(buy);
        if price > hw {
            meta.high_watermark = tick.price;
            if let Err(e) = self.store.put(&meta).await {
                debug!(stock_code = %tick.stock_code, error = %e, "고점 영속화 실패");
            }
            let mut positions = self.positions.write().await;
            if let Some(pair) = positions.get_mut(&tick.stock_code) {
                pair.0.high_watermark = tick.price;
                pair.1.high_watermark = tick.price;
            }
        }
        let hw = hw.max(price);

        let context = self
            .context_cache
            .get()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| TradingContext::fallback(trader_core::time::kst_now().date_naive()));
        let regime = context.market_regime;
        let macro_stop_mult = context.clamped_stop_loss_multiplier();

        let indicators = self.indicators_for(&tick.stock_code, price).await;
        let holding_days = (Utc::now() - meta.bought_at).num_days();

        let ctx = PositionContext {
            stock_code: tick.stock_code.clone(),
            current_price: price,
            buy_price: buy,
            quantity: position.quantity,
            profit_pct: (price / buy - 1.0) * 100.0,
            high_watermark: hw,
            high_profit_pct: (hw / buy - 1.0) * 100.0,
            atr: indicators.atr,
            rsi: indicators.rsi,
            holding_days,
            scale_out_level: meta.scale_out_level,
            rsi_sold: meta.rsi_sold,
            ma5: indicators.ma5,
            ma20: indicators.ma20,
            prev_ma5: indicators.prev_ma5,
            prev_ma20: indicators.prev_ma20,
        };

        let Some(decision) = evaluate_exit(&ctx, regime, macro_stop_mult, &self.sell_cfg) else {
            return;
        };

        position.current_price = Some(tick.price);
        self.emit_sell_order(&position, &mut meta, &decision, price, buy, holding_days)
            .await;
    }

    /// SellOrder 발행. 스케일아웃 커서/RSI 플래그는 **발행 전** 영속화 —
    /// 크래시가 같은 단계를 재발화시키지 않도록.
    async fn emit_sell_order(
        &self,
        position: &Position,
        meta: &mut PositionMeta,
        decision: &ExitDecision,
        price: f64,
        buy: f64,
        holding_days: i64,
    ) {
        let sell_qty = ((position.quantity as f64) * decision.quantity_pct / 100.0).floor() as i64;
        let sell_qty = sell_qty.clamp(1, position.quantity);

        let mut meta_dirty = false;
        if decision.reason == trader_core::SellReason::ScaleOut {
            meta.scale_out_level += 1;
            meta_dirty = true;
        }
        if decision.reason == trader_core::SellReason::RsiOverbought {
            meta.rsi_sold = true;
            meta_dirty = true;
        }
        if meta_dirty {
            if let Err(e) = self.store.put(meta).await {
                error!(
                    stock_code = %position.stock_code,
                    error = %e,
                    "커서 영속화 실패 — 발행 보류"
                );
                return;
            }
            let mut positions = self.positions.write().await;
            if let Some(pair) = positions.get_mut(&position.stock_code) {
                pair.1 = meta.clone();
            }
        }

        let order = SellOrder {
            stock_code: position.stock_code.clone(),
            stock_name: position.stock_name.clone(),
            sell_reason: decision.reason,
            current_price: Decimal::from_f64(price).unwrap_or(position.average_buy_price),
            quantity: sell_qty,
            timestamp: Utc::now(),
            buy_price: Some(position.average_buy_price),
            profit_pct: Some(((price / buy - 1.0) * 100.0 * 100.0).round() / 100.0),
            holding_days: Some(holding_days),
        };

        match self.publisher.publish(&order).await {
            Ok(_) => info!(
                stock_code = %position.stock_code,
                sell_reason = %decision.reason,
                quantity = sell_qty,
                reason = %decision.description,
                "매도 주문 발행"
            ),
            Err(e) => error!(
                stock_code = %position.stock_code,
                error = %e,
                "매도 주문 발행 실패"
            ),
        }
    }

    /// 일봉 기반 지표 — 5분 TTL 캐시, 실패 시 ATR 2% 폴백.
    async fn indicators_for(&self, code: &StockCode, current_price: f64) -> Indicators {
        {
            let cache = self.indicators.lock().await;
            if let Some(cached) = cache.get(code) {
                if cached.fetched_at.elapsed() < INDICATOR_TTL {
                    return cached.clone();
                }
            }
        }

        let computed = match self.gateway.daily_prices(code, 30).await {
            Ok(daily) if daily.len() >= 2 => {
                // KIS 일봉은 최신순 — 시간순으로 뒤집어 계산
                let mut closes: Vec<f64> = daily
                    .iter()
                    .filter_map(|d| d.close_price.to_f64())
                    .collect();
                closes.reverse();
                let mut bars: Vec<OhlcBar> = daily
                    .iter()
                    .filter_map(|d| {
                        Some(OhlcBar {
                            high: d.high_price.to_f64()?,
                            low: d.low_price.to_f64()?,
                            close: d.close_price.to_f64()?,
                        })
                    })
                    .collect();
                bars.reverse();

                let atr_raw = trader_core::indicators::atr(&bars, 14).unwrap_or(0.0);
                let prev = &closes[..closes.len().saturating_sub(1)];
                Indicators {
                    atr: clamp_atr(atr_raw, current_price),
                    rsi: trader_core::indicators::rsi(&closes, 14),
                    ma5: sma(&closes, 5),
                    ma20: sma(&closes, 20),
                    prev_ma5: sma(prev, 5),
                    prev_ma20: sma(prev, 20),
                    fetched_at: Instant::now(),
                }
            }
            Ok(_) => fallback_indicators(current_price),
            Err(e) => {
                debug!(stock_code = %code, error = %e, "일봉 조회 실패 — ATR 2% 폴백");
                fallback_indicators(current_price)
            }
        };

        self.indicators
            .lock()
            .await
            .insert(code.clone(), computed.clone());
        computed
    }

    /// 보유 중인 코드 수.
    pub async fn held_count(&self) -> usize {
        self.positions.read().await.len()
    }
}

fn fallback_indicators(current_price: f64) -> Indicators {
    Indicators {
        atr: clamp_atr(0.0, current_price),
        rsi: None,
        ma5: None,
        ma20: None,
        prev_ma5: None,
        prev_ma20: None,
        fetched_at: Instant::now(),
    }
}

/// 대사 실패 에러.
#[derive(Debug)]
pub struct ReconcileError(pub String);

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ReconcileError {}

/// 고정된 키로 positions:live 캐시 구성.
pub fn positions_live_cache(conn: redis::aio::ConnectionManager) -> TypedCache<PositionsLive> {
    TypedCache::new(conn, keys::CACHE_POSITIONS_LIVE).with_ttl(keys::POSITIONS_LIVE_TTL_SECS)
}
