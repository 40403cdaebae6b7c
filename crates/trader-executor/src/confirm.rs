//! 주문 체결 확인 프로토콜.
//!
//! 주문 접수 후 order-status를 2초 간격으로 최대 3회 폴링합니다
//! (전체 기한 10초 — 운영에서 안정적이었던 값).
//!
//! - 체결 → Filled
//! - 미체결 → 취소 시도. 취소 성공 → Unfilled
//! - 취소 실패(그 사이 체결) → 마지막 상태 조회 한 번. 체결이면 Filled,
//!   아니면 Uncertain — 모니터의 30초 대사가 유령 체결을 수습

use rust_decimal::Decimal;
use tracing::{info, warn};

use trader_core::config::ExecutorConfig;
use trader_gateway::GatewayClient;

/// DRYRUN 모드 센티널 주문번호 — 폴링 생략.
pub const DRYRUN_ORDER_NO: &str = "DRYRUN-0000";

/// 확인 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// 체결 확인
    Filled { quantity: i64, avg_price: Decimal },
    /// 미체결 확정 (취소 완료)
    Unfilled,
    /// 체결/취소 모두 확인 불가 — 대사가 수습
    Uncertain,
}

/// 체결 확인 폴링.
///
/// `expected_qty`/`fallback_price`는 상태 응답에 체결 정보가 비어 있을 때의
/// 폴백입니다.
pub async fn confirm_fill(
    gateway: &GatewayClient,
    order_no: &str,
    expected_qty: i64,
    fallback_price: Decimal,
    config: &ExecutorConfig,
) -> ConfirmOutcome {
    if order_no == DRYRUN_ORDER_NO {
        return ConfirmOutcome::Filled {
            quantity: expected_qty,
            avg_price: fallback_price,
        };
    }

    let deadline = tokio::time::Instant::now() + config.confirm_deadline;

    for attempt in 1..=config.confirm_poll_attempts {
        tokio::time::sleep(config.confirm_poll_interval).await;

        match gateway.order_status(order_no).await {
            Ok(status) if status.filled => {
                let quantity = if status.filled_qty > 0 {
                    status.filled_qty
                } else {
                    expected_qty
                };
                return ConfirmOutcome::Filled {
                    quantity,
                    avg_price: status.avg_price.unwrap_or(fallback_price),
                };
            }
            Ok(_) => {
                info!(order_no = %order_no, attempt, "미체결 — 재폴링");
            }
            Err(e) => {
                warn!(order_no = %order_no, attempt, error = %e, "체결 상태 조회 실패");
            }
        }

        if tokio::time::Instant::now() >= deadline {
            break;
        }
    }

    // 기한 내 미체결 — 취소 시도
    match gateway.cancel(order_no).await {
        Ok(true) => {
            info!(order_no = %order_no, "미체결 주문 취소");
            ConfirmOutcome::Unfilled
        }
        Ok(false) => {
            // 취소 거부 — 그 사이 체결됐을 가능성. 마지막 확인 한 번.
            match gateway.order_status(order_no).await {
                Ok(status) if status.filled => ConfirmOutcome::Filled {
                    quantity: if status.filled_qty > 0 {
                        status.filled_qty
                    } else {
                        expected_qty
                    },
                    avg_price: status.avg_price.unwrap_or(fallback_price),
                },
                _ => {
                    warn!(order_no = %order_no, "취소 불가 + 체결 미확인");
                    ConfirmOutcome::Uncertain
                }
            }
        }
        Err(e) => {
            warn!(order_no = %order_no, error = %e, "취소 요청 실패");
            ConfirmOutcome::Uncertain
        }
    }
}
