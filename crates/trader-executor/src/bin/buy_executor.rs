//! Buy Executor 서비스 엔트리포인트.
//!
//! `stream:buy-signals`를 소비합니다. 코드 간 병렬(세마포어 8),
//! 같은 코드는 실행기 내부 뮤텍스로 직렬화. 60초마다 300초 이상 유휴인
//! pending 메시지를 회수해 재처리합니다 — 재전달된 시그널은 사전 체크
//! (기보유/쿨다운/락)에서 자연히 no-op이 됩니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trader_core::{AppConfig, BuySignal};
use trader_executor::{BuyExecutor, ProcessOutcome};
use trader_fabric::bus::PENDING_SCAN_INTERVAL_SECS;
use trader_fabric::{keys, RawMessage, TypedStreamConsumer};
use trader_gateway::GatewayClient;
use trader_notification::TelegramSender;

/// 동시 처리 상한 (코드 간 병렬).
const MAX_IN_FLIGHT: usize = 8;

async fn handle_raw(
    consumer: &TypedStreamConsumer<BuySignal>,
    executor: &BuyExecutor,
    raw: RawMessage,
) {
    let signal = match consumer.parse(&raw) {
        Ok(signal) => signal,
        Err(e) => {
            // 스키마 위반 — dead-letter 후 종결
            if let Err(dl) = consumer.dead_letter(&raw, &e.to_string()).await {
                tracing::error!(error = %dl, "dead-letter 기록 실패");
            }
            return;
        }
    };

    match executor.process_signal(signal).await {
        ProcessOutcome::Done => {
            if let Err(e) = consumer.ack(&raw.id).await {
                tracing::warn!(msg_id = %raw.id, error = %e, "ACK 실패");
            }
        }
        ProcessOutcome::RetryLater => {
            tracing::info!(msg_id = %raw.id, "전송 오류 — pending 복구 대기");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trader_executor=info,trader_fabric=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(dry_run = config.dry_run, "Buy Executor 시작");

    let redis = trader_fabric::connect(&config.redis.url).await?;
    let gateway = GatewayClient::new(config.kis.gateway_url.clone());
    let notifier = TelegramSender::from_config(config.telegram.clone());

    let executor = Arc::new(BuyExecutor::new(gateway, redis.clone(), notifier, config));

    let consumer = Arc::new(
        TypedStreamConsumer::<BuySignal>::new(
            redis.clone(),
            keys::STREAM_BUY_SIGNALS,
            keys::GROUP_BUY_EXECUTOR,
            format!("buy-executor-{}", std::process::id()),
        )
        .await?,
    );

    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

    // Pending 회수 루프 — 크래시한 소비자의 메시지를 넘겨받음
    {
        let consumer = Arc::clone(&consumer);
        let executor = Arc::clone(&executor);
        let semaphore = Arc::clone(&semaphore);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(PENDING_SCAN_INTERVAL_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match consumer.reclaim_stale().await {
                    Ok(reclaimed) => {
                        for raw in reclaimed {
                            let Ok(permit) =
                                Arc::clone(&semaphore).acquire_owned().await
                            else {
                                return;
                            };
                            let consumer = Arc::clone(&consumer);
                            let executor = Arc::clone(&executor);
                            tokio::spawn(async move {
                                handle_raw(&consumer, &executor, raw).await;
                                drop(permit);
                            });
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "pending 회수 실패"),
                }
            }
        });
    }

    // 메인 소비 루프
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("종료 신호 수신");
                break;
            }
            batch = consumer.fetch() => {
                match batch {
                    Ok(messages) => {
                        for raw in messages {
                            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await
                            else {
                                break;
                            };
                            let consumer = Arc::clone(&consumer);
                            let executor = Arc::clone(&executor);
                            tokio::spawn(async move {
                                handle_raw(&consumer, &executor, raw).await;
                                drop(permit);
                            });
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "시그널 읽기 실패 — 5초 후 재시도");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    // 진행 중 작업 드레인 (10초 기한)
    let drain = semaphore.acquire_many(MAX_IN_FLIGHT as u32);
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        tracing::warn!("인플라이트 드레인 기한 초과");
    }

    tracing::info!("Buy Executor 종료");
    Ok(())
}
