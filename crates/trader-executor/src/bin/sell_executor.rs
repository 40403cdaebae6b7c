//! Sell Executor 서비스 엔트리포인트.
//!
//! `stream:sell-orders`를 소비합니다. 모니터 외에 텔레그램 봇의 MANUAL
//! 주문도 이 스트림으로 들어옵니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trader_core::{AppConfig, SellOrder};
use trader_executor::{ProcessOutcome, SellExecutor};
use trader_fabric::bus::PENDING_SCAN_INTERVAL_SECS;
use trader_fabric::{keys, RawMessage, TypedStreamConsumer};
use trader_gateway::GatewayClient;
use trader_notification::TelegramSender;

const MAX_IN_FLIGHT: usize = 8;

async fn handle_raw(
    consumer: &TypedStreamConsumer<SellOrder>,
    executor: &SellExecutor,
    raw: RawMessage,
) {
    let order = match consumer.parse(&raw) {
        Ok(order) => order,
        Err(e) => {
            if let Err(dl) = consumer.dead_letter(&raw, &e.to_string()).await {
                tracing::error!(error = %dl, "dead-letter 기록 실패");
            }
            return;
        }
    };

    match executor.process_order(order).await {
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
    tracing::info!(dry_run = config.dry_run, "Sell Executor 시작");

    let redis = trader_fabric::connect(&config.redis.url).await?;
    let gateway = GatewayClient::new(config.kis.gateway_url.clone());
    let notifier = TelegramSender::from_config(config.telegram.clone());

    let executor = Arc::new(SellExecutor::new(gateway, redis.clone(), notifier, config));

    let consumer = Arc::new(
        TypedStreamConsumer::<SellOrder>::new(
            redis.clone(),
            keys::STREAM_SELL_ORDERS,
            keys::GROUP_SELL_EXECUTOR,
            format!("sell-executor-{}", std::process::id()),
        )
        .await?,
    );

    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

    // Pending 회수 루프
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
                        tracing::error!(error = %e, "매도 주문 읽기 실패 — 5초 후 재시도");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    let drain = semaphore.acquire_many(MAX_IN_FLIGHT as u32);
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        tracing::warn!("인플라이트 드레인 기한 초과");
    }

    tracing::info!("Sell Executor 종료");
    Ok(())
}
