//! Sell Executor — 매도 주문 처리 파이프라인.
//!
//! 확인(confirmation)은 필수입니다. 확인 실패 시 포지션 상태는 불확실로
//! 남고 모니터의 30초 대사가 수습합니다. 일반 매도의 거래소 실패는 자동
//! 재시도하지 않습니다 — 조건이 유지되면 모니터가 다음 틱에 다시
//! SellOrder를 냅니다. 하드 스톱(STOP_LOSS)만 2초 백오프로 최대 3회
//! 재시도합니다.

use std::sync::Arc;

use chrono::Utc;
use redis::aio::ConnectionManager;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use trader_core::{
    AppConfig, OrderRequest, OrderType, Position, SellOrder, SellReason, StockCode, TradeRecord,
    TradeType,
};
use trader_fabric::{
    keys, Cooldowns, DistributedLock, PositionStore, TradeMarkers, TypedStreamPublisher,
};
use trader_gateway::{GatewayClient, GatewayClientError};
use trader_notification::{notify, AlertLevel, TelegramSender};

use crate::code_locks::CodeLocks;
use crate::confirm::{confirm_fill, ConfirmOutcome, DRYRUN_ORDER_NO};
use crate::ProcessOutcome;

pub struct SellExecutor {
    gateway: GatewayClient,
    redis: ConnectionManager,
    lock: DistributedLock,
    cooldowns: Cooldowns,
    markers: TradeMarkers,
    store: PositionStore,
    trade_log: TypedStreamPublisher<TradeRecord>,
    code_locks: CodeLocks,
    notifier: Option<Arc<TelegramSender>>,
    config: AppConfig,
}

impl SellExecutor {
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
            markers: TradeMarkers::new(redis.clone()),
            store: PositionStore::new(redis.clone()),
            trade_log: TypedStreamPublisher::new(redis.clone(), keys::STREAM_TRADE_RECORDS),
            redis,
            code_locks: CodeLocks::new(),
            notifier,
            config,
        }
    }

    /// 매도 주문 하나 처리.
    pub async fn process_order(&self, order: SellOrder) -> ProcessOutcome {
        let code = order.stock_code.clone();

        if let Err(e) = order.validate() {
            info!(stock_code = %code, error = %e, "매도 주문 검증 실패 — 거부");
            return ProcessOutcome::Done;
        }

        let is_manual = order.sell_reason == SellReason::Manual;

        // 비상 정지 (MANUAL은 통과 — 운영자 수동 청산 경로)
        if !is_manual {
            match trader_fabric::locks::is_emergency_paused(&self.redis).await {
                Ok(true) => {
                    info!(stock_code = %code, "비상 정지 활성 — 매도 보류");
                    return ProcessOutcome::Done;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(stock_code = %code, error = %e, "비상 정지 조회 실패");
                    return ProcessOutcome::RetryLater;
                }
            }
        }

        let _guard = self.code_locks.acquire(&code).await;

        // 분산 매도 락 (30초 TTL)
        let lock_key = keys::sell_lock(&code);
        match self
            .lock
            .acquire(&lock_key, self.config.executor.sell_lock_ttl_secs)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(stock_code = %code, "매도 락 경합 — 진행 중 주문 존재");
                return ProcessOutcome::Done;
            }
            Err(e) => {
                warn!(stock_code = %code, error = %e, "매도 락 획득 실패");
                return ProcessOutcome::RetryLater;
            }
        }

        let outcome = self.process_locked(&order).await;

        if let Err(e) = self.lock.release(&lock_key).await {
            warn!(stock_code = %code, error = %e, "매도 락 해제 실패");
        }
        outcome
    }

    async fn process_locked(&self, order: &SellOrder) -> ProcessOutcome {
        let code = &order.stock_code;

        // 보유 확인 + 수량 클램프
        let portfolio = match self.gateway.balance().await {
            Ok(state) => state,
            Err(e) if e.is_transport() => {
                warn!(stock_code = %code, error = %e, "잔고 조회 실패 — 재전달 대기");
                return ProcessOutcome::RetryLater;
            }
            Err(e) => {
                info!(stock_code = %code, error = %e, "잔고 조회 거부 — 매도 중단");
                return ProcessOutcome::Done;
            }
        };
        let Some(position) = portfolio.position(code).cloned() else {
            info!(stock_code = %code, "미보유 종목 매도 주문 — 무시");
            return ProcessOutcome::Done;
        };

        let sell_qty = order.quantity.min(position.quantity);
        if sell_qty <= 0 {
            info!(stock_code = %code, "매도 가능 수량 없음");
            return ProcessOutcome::Done;
        }

        // 하드 스톱은 전송 실패에 한해 제한 재시도
        let is_hard_stop = order.sell_reason == SellReason::StopLoss;
        let max_attempts = if is_hard_stop {
            self.config.executor.hard_stop_retry_attempts
        } else {
            1
        };

        let request = OrderRequest {
            stock_code: code.clone(),
            quantity: sell_qty,
            order_type: OrderType::Market,
            price: None,
        };

        let mut last_error: Option<GatewayClientError> = None;
        for attempt in 1..=max_attempts {
            let result = if self.config.dry_run {
                info!(stock_code = %code, quantity = sell_qty, "[DRYRUN] 매도 주문 생략");
                trader_core::OrderResult {
                    success: true,
                    order_no: Some(DRYRUN_ORDER_NO.to_string()),
                    stock_code: code.clone(),
                    quantity: sell_qty,
                    filled_quantity: sell_qty,
                    avg_fill_price: Some(order.current_price),
                    message: Some("dryrun".to_string()),
                }
            } else {
                match self.gateway.sell(&request).await {
                    Ok(result) => result,
                    Err(e) if e.is_transport() && attempt < max_attempts => {
                        warn!(
                            stock_code = %code,
                            attempt,
                            error = %e,
                            "매도 전송 실패 — 백오프 후 재시도"
                        );
                        tokio::time::sleep(self.config.executor.hard_stop_retry_backoff).await;
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) if e.is_transport() => {
                        // 일반 매도는 재시도하지 않음 — 모니터가 다음 틱에 재발행
                        warn!(stock_code = %code, error = %e, "매도 전송 실패");
                        return if is_hard_stop {
                            ProcessOutcome::RetryLater
                        } else {
                            ProcessOutcome::Done
                        };
                    }
                    Err(e) => {
                        self.alert_rejection(code, &e.to_string());
                        return ProcessOutcome::Done;
                    }
                }
            };

            if !result.success {
                let message = result.message.unwrap_or_default();
                self.alert_rejection(code, &message);
                return ProcessOutcome::Done;
            }

            let Some(order_no) = result.order_no else {
                error!(stock_code = %code, "주문번호 없는 매도 접수 응답");
                return ProcessOutcome::Done;
            };

            return self
                .confirm_and_settle(order, &position, sell_qty, &order_no)
                .await;
        }

        if let Some(e) = last_error {
            error!(stock_code = %code, error = %e, "하드 스톱 재시도 소진");
        }
        ProcessOutcome::RetryLater
    }

    /// 체결 확인 → 포지션 전이 + 쿨다운/기록.
    async fn confirm_and_settle(
        &self,
        order: &SellOrder,
        position: &Position,
        sell_qty: i64,
        order_no: &str,
    ) -> ProcessOutcome {
        let code = &order.stock_code;

        let (filled_qty, fill_price) = match confirm_fill(
            &self.gateway,
            order_no,
            sell_qty,
            order.current_price,
            &self.config.executor,
        )
        .await
        {
            ConfirmOutcome::Filled {
                quantity,
                avg_price,
            } => (quantity, avg_price),
            ConfirmOutcome::Unfilled => {
                info!(stock_code = %code, "매도 미체결 — 취소 완료 (모니터 재평가 대기)");
                return ProcessOutcome::Done;
            }
            ConfirmOutcome::Uncertain => {
                error!(
                    stock_code = %code,
                    order_no = %order_no,
                    "매도 체결 확인 실패 — 포지션 불확실"
                );
                notify(
                    &self.notifier,
                    AlertLevel::Critical,
                    format!(
                        "[매도] {} 체결 확인 실패 (주문 {}) — 대사 확인 필요",
                        code, order_no
                    ),
                );
                return ProcessOutcome::Done;
            }
        };

        let buy_price = position.average_buy_price;
        let profit_pct = if buy_price > Decimal::ZERO {
            ((fill_price - buy_price) / buy_price)
                .to_f64()
                .map(|r| (r * 10_000.0).round() / 100.0)
        } else {
            None
        };
        let profit_amount = (fill_price - buy_price) * Decimal::from(filled_qty);
        let full_exit = filled_qty >= position.quantity;

        if full_exit {
            // 전량 청산: 메타 삭제 + 쿨다운 마커
            if let Err(e) = self.store.delete(code).await {
                warn!(stock_code = %code, error = %e, "포지션 메타 삭제 실패");
            }
            if let Err(e) = self
                .cooldowns
                .set_sell_cooldown(code, self.config.risk.sell_cooldown_hours)
                .await
            {
                warn!(stock_code = %code, error = %e, "매도 쿨다운 설정 실패");
            }
            if order.sell_reason.is_stoploss_kind() {
                if let Err(e) = self
                    .cooldowns
                    .set_stoploss_cooldown(code, self.config.risk.stoploss_cooldown_days)
                    .await
                {
                    warn!(stock_code = %code, error = %e, "손절 쿨다운 설정 실패");
                }
            }
        } else {
            // 부분 청산(스케일아웃): 수량/매수금액은 증권사 잔고가 재계산,
            // 고점/손절선/커서는 메타에 유지 (커서는 모니터가 발행 전 전진)
            info!(
                stock_code = %code,
                sold = filled_qty,
                remaining = position.quantity - filled_qty,
                "부분 청산"
            );
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
            stock_name: order.stock_name.clone(),
            trade_type: TradeType::Sell,
            quantity: filled_qty,
            price: fill_price,
            total_amount: Decimal::from(filled_qty) * fill_price,
            reason: order.sell_reason.to_string(),
            sell_reason: Some(order.sell_reason),
            profit_pct,
            profit_amount: Some(profit_amount),
            holding_days: order.holding_days,
            market_regime: None,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.trade_log.publish(&record).await {
            warn!(error = %e, "거래 기록 발행 실패");
        }

        info!(
            stock_code = %code,
            sell_reason = %order.sell_reason,
            quantity = filled_qty,
            fill_price = %fill_price,
            profit_pct = profit_pct.unwrap_or(0.0),
            full_exit,
            "매도 체결"
        );
        notify(
            &self.notifier,
            AlertLevel::Info,
            format!(
                "[매도] {} {} {}주 @ {} ({}, {:+.1}%)",
                order.stock_name,
                code,
                filled_qty,
                fill_price,
                order.sell_reason,
                profit_pct.unwrap_or(0.0)
            ),
        );

        ProcessOutcome::Done
    }

    /// 장중 증권사 매도 거부 알림.
    fn alert_rejection(&self, code: &StockCode, message: &str) {
        warn!(stock_code = %code, message = %message, "매도 거부");
        if trader_core::krx::session_at(trader_core::time::kst_now().time()).is_open() {
            notify(
                &self.notifier,
                AlertLevel::Warning,
                format!("[매도 거부] {} — {}", code, message),
            );
        }
    }
}
