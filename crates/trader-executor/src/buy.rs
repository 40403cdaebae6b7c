//! Buy Executor — 매수 시그널 처리 파이프라인.
//!
//! 사전 체크는 고정 순서로 fail-fast:
//!
//! 1. 장 세션 (09:00–15:30 거래일, MANUAL 우회)
//! 2. 비상 정지 플래그
//! 3. 분산 매수 락 (180초 TTL)
//! 4. 기보유 여부
//! 5. 중복 주문 윈도우 (10분)
//! 6. Scout 거부권 / 하드 플로어 (hybrid < 40)
//! 7. 쿨다운 (손절 3일 / 매도 24시간)
//! 8. 상관관계 (60일 로그수익률 Pearson ≥ 0.85)
//! 9. 포트폴리오 가드 (사이징 후 금액 기준)

use std::sync::Arc;

use chrono::Utc;
use redis::aio::ConnectionManager;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use trader_core::krx::{align_to_tick, session_at};
use trader_core::time::kst_now;
use trader_core::{
    AppConfig, BuySignal, HotWatchlist, OrderRequest, OrderType, PortfolioState, Position,
    PositionMeta, SectorGroup, StockCode, TradeRecord, TradeTier, TradeType, TradingContext,
};
use trader_fabric::{
    check_portfolio, keys, Cooldowns, CorrelationCache, DailyBuyCounter, DistributedLock,
    GuardVerdict, PositionStore, TradeMarkers, TypedCache, TypedStreamPublisher,
};
use trader_gateway::{GatewayClient, GatewayClientError};
use trader_notification::{notify, AlertLevel, TelegramSender};

use crate::code_locks::CodeLocks;
use crate::confirm::{confirm_fill, ConfirmOutcome, DRYRUN_ORDER_NO};
use crate::sizing::{calculate_quantity, SizingInput, SizingOutcome};
use crate::ProcessOutcome;

pub struct BuyExecutor {
    gateway: GatewayClient,
    redis: ConnectionManager,
    lock: DistributedLock,
    cooldowns: Cooldowns,
    daily_counter: DailyBuyCounter,
    markers: TradeMarkers,
    correlation_cache: CorrelationCache,
    store: PositionStore,
    trade_log: TypedStreamPublisher<TradeRecord>,
    context_cache: TypedCache<TradingContext>,
    watchlist_cache: TypedCache<HotWatchlist>,
    code_locks: CodeLocks,
    notifier: Option<Arc<TelegramSender>>,
    config: AppConfig,
    /// 거래일 판정 캐시 (KST 날짜당 1회 조회)
    trading_day: Mutex<Option<(chrono::NaiveDate, bool)>>,
}

impl BuyExecutor {
    pub fn new(
        gateway: GatewayClient,
        redis: ConnectionManager,
        notifier: Option<Arc<TelegramSender>>,
        config: AppConfig,
    ) -> Self {
        Self {
            gateway,
            lock: DistributedLock::new(redis.clone()),
            cooldowns: Cooldowns::new(redis.clone()),
            daily_counter: DailyBuyCounter::new(redis.clone()),
            markers: TradeMarkers::new(redis.clone()),
            correlation_cache: CorrelationCache::new(redis.clone()),
            store: PositionStore::new(redis.clone()),
            trade_log: TypedStreamPublisher::new(redis.clone(), keys::STREAM_TRADE_RECORDS),
            context_cache: TypedCache::new(redis.clone(), keys::CACHE_TRADING_CONTEXT),
            watchlist_cache: TypedCache::new(redis.clone(), keys::CACHE_WATCHLIST),
            redis,
            code_locks: CodeLocks::new(),
            notifier,
            config,
            trading_day: Mutex::new(None),
        }
    }

    /// 시그널 하나 처리. 반환값이 ACK 여부를 결정합니다.
    pub async fn process_signal(&self, signal: BuySignal) -> ProcessOutcome {
        let code = signal.stock_code.clone();

        // 경계 재검증 — 스캐너를 신뢰하지 않음
        if let Err(e) = signal.validate() {
            info!(stock_code = %code, error = %e, "시그널 검증 실패 — 거부");
            return ProcessOutcome::Done;
        }

        // 프로세스 내 직렬화
        let _guard = self.code_locks.acquire(&code).await;

        // 1. 장 세션 — 정규장 09:00~15:30만 진입 허용 (MANUAL 우회)
        if signal.source != "manual" {
            let now = kst_now();
            let open = chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap();
            let close = chrono::NaiveTime::from_hms_opt(15, 30, 0).unwrap();
            if !trader_core::time::within_window(now.time(), open, close) {
                return self.reject(&code, "market_session", "장 시간 외");
            }
            match self.is_trading_day_cached(now.date_naive()).await {
                Ok(true) => {}
                Ok(false) => return self.reject(&code, "market_session", "휴장일"),
                Err(e) if e.is_transport() => {
                    warn!(stock_code = %code, error = %e, "거래일 조회 실패 — 재전달 대기");
                    return ProcessOutcome::RetryLater;
                }
                Err(e) => return self.reject(&code, "market_session", &e.to_string()),
            }
        }

        // 2. 비상 정지
        match trader_fabric::locks::is_emergency_paused(&self.redis).await {
            Ok(true) => return self.reject(&code, "emergency_stop", "비상 정지 활성"),
            Ok(false) => {}
            Err(e) => {
                warn!(stock_code = %code, error = %e, "비상 정지 조회 실패");
                return ProcessOutcome::RetryLater;
            }
        }

        // 3. 분산 매수 락
        let lock_key = keys::buy_lock(&code);
        match self
            .lock
            .acquire(&lock_key, self.config.executor.buy_lock_ttl_secs)
            .await
        {
            Ok(true) => {}
            Ok(false) => return self.reject(&code, "buy_lock", "락 경합 — 중복 시그널"),
            Err(e) => {
                warn!(stock_code = %code, error = %e, "락 획득 실패");
                return ProcessOutcome::RetryLater;
            }
        }

        let outcome = self.process_locked(&signal).await;

        if let Err(e) = self.lock.release(&lock_key).await {
            warn!(stock_code = %code, error = %e, "락 해제 실패 (TTL 만료 대기)");
        }
        outcome
    }

    /// 락 보유 구간 — 체크 4~9, 사이징, 주문, 확인, 영속화.
    async fn process_locked(&self, signal: &BuySignal) -> ProcessOutcome {
        let code = &signal.stock_code;

        // 포트폴리오 스냅샷 (4, 8, 9에서 사용)
        let portfolio = match self.gateway.balance().await {
            Ok(state) => state,
            Err(e) if e.is_transport() => {
                warn!(stock_code = %code, error = %e, "잔고 조회 실패 — 재전달 대기");
                return ProcessOutcome::RetryLater;
            }
            Err(e) => return self.reject(code, "balance", &e.to_string()),
        };

        // 4. 기보유
        if portfolio.holds(code) {
            return self.reject(code, "already_held", "이미 보유 중");
        }

        // 5. 중복 주문 윈도우
        match self.markers.recently_traded(code).await {
            Ok(true) => return self.reject(code, "duplicate_window", "10분 내 거래 기록 존재"),
            Ok(false) => {}
            Err(e) => {
                warn!(stock_code = %code, error = %e, "거래 마커 조회 실패");
                return ProcessOutcome::RetryLater;
            }
        }

        // 6. Scout 거부권 / 하드 플로어
        if signal.trade_tier == TradeTier::Blocked {
            return self.reject(code, "scout_veto", "BLOCKED 티어");
        }
        if signal.hybrid_score < self.config.risk.hard_floor_score {
            return self.reject(
                code,
                "hard_floor",
                &format!(
                    "hybrid {:.1} < {:.0}",
                    signal.hybrid_score, self.config.risk.hard_floor_score
                ),
            );
        }

        // 7. 쿨다운
        match self.cooldowns.is_stoploss_cooldown(code).await {
            Ok(true) => return self.reject(code, "stoploss_cooldown", "손절 후 재진입 제한"),
            Ok(false) => {}
            Err(_) => return ProcessOutcome::RetryLater,
        }
        match self.cooldowns.is_sell_cooldown(code).await {
            Ok(true) => return self.reject(code, "sell_cooldown", "매도 후 24시간 제한"),
            Ok(false) => {}
            Err(_) => return ProcessOutcome::RetryLater,
        }

        // 8. 상관관계
        if self.config.risk.correlation_check_enabled && !portfolio.positions.is_empty() {
            if let Some((held_code, corr)) = self.max_correlation(code, &portfolio).await {
                if corr >= self.config.risk.correlation_block_threshold {
                    return self.reject(
                        code,
                        "correlation",
                        &format!(
                            "{}와 상관 {:.2} >= {:.2}",
                            held_code, corr, self.config.risk.correlation_block_threshold
                        ),
                    );
                }
            }
        }

        // 현재가 — 스냅샷 실패 시 시그널 가격 폴백
        let current_price = match self.gateway.snapshot(code).await {
            Ok(snapshot) if snapshot.price > Decimal::ZERO => snapshot.price,
            Ok(_) => signal.signal_price,
            Err(e) => {
                warn!(stock_code = %code, error = %e, "현재가 조회 실패 — 시그널 가격 사용");
                signal.signal_price
            }
        };

        // 매크로 컨텍스트
        let context = self
            .context_cache
            .get()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| TradingContext::fallback(kst_now().date_naive()));

        // 포지션 사이징
        let sizing = calculate_quantity(&SizingInput {
            hybrid_score: signal.hybrid_score,
            signal_multiplier: signal.position_multiplier,
            context_multiplier: context.clamped_position_multiplier(),
            total_asset: portfolio.total_asset,
            available_cash: portfolio.cash_balance,
            price: current_price,
            min_order_amount: self.config.executor.min_order_amount,
        });
        let quantity = match sizing {
            SizingOutcome::Quantity(q) => q,
            SizingOutcome::TooSmall => return self.reject(code, "sizing", "TOO_SMALL"),
        };
        let buy_amount = Decimal::from(quantity) * current_price;

        // 9. 포트폴리오 가드
        let daily_count = self
            .daily_counter
            .count(kst_now().date_naive())
            .await
            .unwrap_or(0);
        let verdict = check_portfolio(
            buy_amount,
            signal.sector_group,
            &portfolio,
            context.market_regime,
            daily_count,
            &self.config.risk,
        );
        if let GuardVerdict::Block { check, reason } = verdict {
            return self.reject(code, check, &reason);
        }

        // 주문 실행 + 확인
        self.execute_order(signal, quantity, current_price, &context)
            .await
    }

    /// 주문 유형 선택 → 접수 → 체결 확인 → 포지션 영속화.
    async fn execute_order(
        &self,
        signal: &BuySignal,
        quantity: i64,
        current_price: Decimal,
        context: &TradingContext,
    ) -> ProcessOutcome {
        let code = &signal.stock_code;

        // 모멘텀 계열은 프리미엄 지정가, 그 외 시장가
        let order = if signal.signal_type.is_momentum_family() {
            let premium =
                Decimal::from_f64(1.0 + self.config.executor.momentum_limit_premium)
                    .unwrap_or(Decimal::ONE);
            let limit_price = align_to_tick(current_price * premium);
            OrderRequest {
                stock_code: code.clone(),
                quantity,
                order_type: OrderType::Limit,
                price: Some(limit_price),
            }
        } else {
            OrderRequest {
                stock_code: code.clone(),
                quantity,
                order_type: OrderType::Market,
                price: None,
            }
        };

        let result = if self.config.dry_run {
            info!(stock_code = %code, quantity, "[DRYRUN] 매수 주문 생략");
            trader_core::OrderResult {
                success: true,
                order_no: Some(DRYRUN_ORDER_NO.to_string()),
                stock_code: code.clone(),
                quantity,
                filled_quantity: quantity,
                avg_fill_price: Some(current_price),
                message: Some("dryrun".to_string()),
            }
        } else {
            match self.gateway.buy(&order).await {
                Ok(result) => result,
                Err(e) if e.is_transport() => {
                    warn!(stock_code = %code, error = %e, "주문 전송 실패 — 재전달 대기");
                    return ProcessOutcome::RetryLater;
                }
                Err(e) => {
                    self.alert_session_rejection(code, &e.to_string());
                    return self.reject(code, "order", &e.to_string());
                }
            }
        };

        if !result.success {
            let message = result.message.unwrap_or_default();
            // 장중 증권사 거부 — 운영자 가시성 이벤트
            self.alert_session_rejection(code, &message);
            return self.reject(code, "order_rejected", &message);
        }

        let Some(order_no) = result.order_no else {
            error!(stock_code = %code, "주문번호 없는 접수 응답");
            return self.reject(code, "order", "주문번호 없음");
        };

        match confirm_fill(
            &self.gateway,
            &order_no,
            quantity,
            current_price,
            &self.config.executor,
        )
        .await
        {
            ConfirmOutcome::Filled {
                quantity: filled_qty,
                avg_price,
            } => {
                self.persist_position(signal, filled_qty, avg_price, context)
                    .await
            }
            ConfirmOutcome::Unfilled => {
                self.reject(code, "no_fill", "기한 내 미체결 — 취소 완료")
            }
            ConfirmOutcome::Uncertain => {
                error!(stock_code = %code, order_no = %order_no, "체결 확인 실패");
                notify(
                    &self.notifier,
                    AlertLevel::Critical,
                    format!(
                        "[매수] {} 체결 확인 실패 (주문 {}) — 대사 확인 필요",
                        code, order_no
                    ),
                );
                // 포지션 미영속 — 유령 체결은 모니터 대사가 수습
                ProcessOutcome::Done
            }
        }
    }

    /// 체결 확정 → Position/메타 영속화, 카운터/마커/거래 기록 갱신.
    async fn persist_position(
        &self,
        signal: &BuySignal,
        filled_qty: i64,
        avg_price: Decimal,
        context: &TradingContext,
    ) -> ProcessOutcome {
        let code = &signal.stock_code;
        let stop_pct = self.config.sell.stop_loss_pct / 100.0
            * context.clamped_stop_loss_multiplier();
        let stop_price = align_to_tick(
            avg_price
                * Decimal::from_f64(1.0 - stop_pct).unwrap_or(Decimal::ONE),
        );

        let sector = match signal.sector_group {
            Some(sector) => Some(sector),
            None => self.lookup_sector(code).await,
        };

        let position = Position {
            stock_code: code.clone(),
            stock_name: signal.stock_name.clone(),
            quantity: filled_qty,
            average_buy_price: avg_price,
            total_buy_amount: Decimal::from(filled_qty) * avg_price,
            sector_group: sector,
            high_watermark: avg_price,
            stop_loss_price: stop_price,
            bought_at: Some(Utc::now()),
            current_value: None,
            current_price: Some(avg_price),
        };
        if let Err(e) = position.validate_for_persist() {
            error!(stock_code = %code, error = %e, "포지션 불변식 위반 — 영속 중단");
            return ProcessOutcome::Done;
        }

        let meta = PositionMeta {
            stock_code: code.clone(),
            sector_group: sector,
            high_watermark: avg_price,
            stop_loss_price: stop_price,
            bought_at: Utc::now(),
            scale_out_level: 0,
            rsi_sold: false,
        };
        if let Err(e) = self.store.put(&meta).await {
            error!(stock_code = %code, error = %e, "포지션 메타 저장 실패");
        }

        let today = kst_now().date_naive();
        if let Err(e) = self.daily_counter.increment(today).await {
            warn!(error = %e, "일일 매수 카운터 증가 실패");
        }
        if let Err(e) = self
            .markers
            .mark(code, self.config.executor.duplicate_order_window_secs)
            .await
        {
            warn!(error = %e, "거래 마커 기록 실패");
        }

        let record = TradeRecord {
            stock_code: code.clone(),
            stock_name: signal.stock_name.clone(),
            trade_type: TradeType::Buy,
            quantity: filled_qty,
            price: avg_price,
            total_amount: Decimal::from(filled_qty) * avg_price,
            reason: signal.signal_type.to_string(),
            sell_reason: None,
            profit_pct: None,
            profit_amount: None,
            holding_days: None,
            market_regime: Some(signal.market_regime),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.trade_log.publish(&record).await {
            warn!(error = %e, "거래 기록 발행 실패");
        }

        info!(
            stock_code = %code,
            signal_type = %signal.signal_type,
            quantity = filled_qty,
            avg_price = %avg_price,
            stop_loss = %stop_price,
            hybrid_score = signal.hybrid_score,
            "매수 체결"
        );
        notify(
            &self.notifier,
            AlertLevel::Info,
            format!(
                "[매수] {} {} {}주 @ {} ({})",
                signal.stock_name, code, filled_qty, avg_price, signal.signal_type
            ),
        );

        ProcessOutcome::Done
    }

    /// 보유 종목과의 최대 상관계수 — (코드, 계수). 데이터 없으면 None.
    async fn max_correlation(
        &self,
        candidate: &StockCode,
        portfolio: &PortfolioState,
    ) -> Option<(StockCode, f64)> {
        let lookback = self.config.risk.correlation_lookback_days as usize;

        let candidate_closes = match self.fetch_closes(candidate, lookback).await {
            Some(closes) => closes,
            None => {
                // 데이터 없으면 차단 대신 통과 — 진입이 시세 이력 API 가용성에
                // 결합되지 않도록
                info!(stock_code = %candidate, "상관관계용 일봉 없음 — 체크 생략");
                return None;
            }
        };

        let mut max_pair: Option<(StockCode, f64)> = None;
        for position in &portfolio.positions {
            if &position.stock_code == candidate {
                continue;
            }
            let corr = match self
                .correlation_cache
                .get(candidate, &position.stock_code)
                .await
                .ok()
                .flatten()
            {
                Some(cached) => cached,
                None => {
                    let Some(held_closes) =
                        self.fetch_closes(&position.stock_code, lookback).await
                    else {
                        continue;
                    };
                    let Some(corr) = trader_core::indicators::pearson_log_returns(
                        &candidate_closes,
                        &held_closes,
                        20,
                    ) else {
                        continue;
                    };
                    let _ = self
                        .correlation_cache
                        .put(candidate, &position.stock_code, corr)
                        .await;
                    corr
                }
            };

            if max_pair.as_ref().map_or(true, |(_, best)| corr > *best) {
                max_pair = Some((position.stock_code.clone(), corr));
            }
        }
        max_pair
    }

    async fn fetch_closes(&self, code: &StockCode, days: usize) -> Option<Vec<f64>> {
        let daily = self.gateway.daily_prices(code, days).await.ok()?;
        if daily.len() < 21 {
            return None;
        }
        // 최신순 → 시간순
        let mut closes: Vec<f64> = daily
            .iter()
            .filter_map(|d| d.close_price.to_f64())
            .collect();
        closes.reverse();
        Some(closes)
    }

    /// 워치리스트에서 섹터 조회 (시그널에 없을 때).
    async fn lookup_sector(&self, code: &StockCode) -> Option<SectorGroup> {
        let watchlist = self.watchlist_cache.get().await.ok().flatten()?;
        watchlist.get_stock(code).and_then(|e| e.sector_group)
    }

    async fn is_trading_day_cached(
        &self,
        today: chrono::NaiveDate,
    ) -> Result<bool, GatewayClientError> {
        {
            let cache = self.trading_day.lock().await;
            if let Some((date, trading)) = *cache {
                if date == today {
                    return Ok(trading);
                }
            }
        }
        let trading = self.gateway.is_trading_day(today).await?;
        *self.trading_day.lock().await = Some((today, trading));
        Ok(trading)
    }

    fn reject(&self, code: &StockCode, step: &str, reason: &str) -> ProcessOutcome {
        info!(stock_code = %code, step = step, reason = %reason, "매수 거부");
        ProcessOutcome::Done
    }

    /// 장중 증권사 주문 거부 — 운영자 알림 대상.
    fn alert_session_rejection(&self, code: &StockCode, message: &str) {
        if session_at(kst_now().time()).is_open() {
            notify(
                &self.notifier,
                AlertLevel::Warning,
                format!("[매수 거부] {} — {}", code, message),
            );
        }
    }
}
