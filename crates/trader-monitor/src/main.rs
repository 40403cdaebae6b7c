//! Price Monitor 서비스 엔트리포인트.
//!
//! 틱 소비(리더 1 + 워커 4, 코드 해시 고정 배정)와 30초 대사 루프를
//! 함께 돌립니다.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trader_core::{AppConfig, PriceTick, StockCode, TradingContext};
use trader_fabric::{keys, PositionStore, TypedCache, TypedStreamConsumer, TypedStreamPublisher};
use trader_gateway::GatewayClient;
use trader_monitor::monitor::positions_live_cache;
use trader_monitor::PriceMonitor;

const WORKER_COUNT: usize = 4;
const QUEUE_CAPACITY: usize = 1_000;

/// 대사 주기 (초).
const RECONCILE_INTERVAL_SECS: u64 = 30;

fn worker_index(code: &StockCode) -> usize {
    let mut hasher = DefaultHasher::new();
    code.as_str().hash(&mut hasher);
    (hasher.finish() as usize) % WORKER_COUNT
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trader_monitor=info,trader_fabric=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Price Monitor 시작");

    let redis = trader_fabric::connect(&config.redis.url).await?;
    let gateway = GatewayClient::new(config.kis.gateway_url.clone());

    let context_cache: TypedCache<TradingContext> =
        TypedCache::new(redis.clone(), keys::CACHE_TRADING_CONTEXT);

    let monitor = PriceMonitor::new(
        gateway.clone(),
        PositionStore::new(redis.clone()),
        TypedStreamPublisher::new(redis.clone(), keys::STREAM_SELL_ORDERS),
        positions_live_cache(redis.clone()),
        context_cache,
        config.sell.clone(),
    );

    // 최초 대사 + 보유 코드 구독
    match monitor.reconcile().await {
        Ok(held) => {
            tracing::info!(count = held.len(), "최초 포지션 대사");
            if !held.is_empty() {
                if let Err(e) = gateway.subscribe(&held).await {
                    tracing::warn!(error = %e, "보유 종목 구독 실패");
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "최초 대사 실패 — 30초 후 재시도"),
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // 워커
    let mut senders: Vec<mpsc::Sender<PriceTick>> = Vec::with_capacity(WORKER_COUNT);
    let mut worker_handles = Vec::with_capacity(WORKER_COUNT);
    for worker_id in 0..WORKER_COUNT {
        let (tx, mut rx) = mpsc::channel::<PriceTick>(QUEUE_CAPACITY / WORKER_COUNT);
        senders.push(tx);
        let monitor = Arc::clone(&monitor);
        worker_handles.push(tokio::spawn(async move {
            while let Some(tick) = rx.recv().await {
                monitor.on_tick(&tick).await;
            }
            tracing::debug!(worker_id, "모니터 워커 종료");
        }));
    }

    // 30초 대사 루프
    {
        let monitor = Arc::clone(&monitor);
        let gateway = gateway.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(RECONCILE_INTERVAL_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;
            let mut last_held: Vec<StockCode> = Vec::new();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        match monitor.reconcile().await {
                            Ok(held) => {
                                if held != last_held && !held.is_empty() {
                                    if let Err(e) = gateway.subscribe(&held).await {
                                        tracing::warn!(error = %e, "보유 종목 구독 갱신 실패");
                                    }
                                }
                                last_held = held;
                            }
                            Err(e) => tracing::warn!(error = %e, "대사 실패"),
                        }
                    }
                }
            }
        });
    }

    // 리더 — 틱 소비 (ACK 우선)
    let consumer: TypedStreamConsumer<PriceTick> = TypedStreamConsumer::new(
        redis.clone(),
        keys::STREAM_TICKS,
        keys::GROUP_MONITOR,
        format!("monitor-{}", std::process::id()),
    )
    .await?;

    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("종료 신호 수신");
                let _ = shutdown_tx.send(());
                break;
            }
            batch = consumer.next_records_ack_first() => {
                match batch {
                    Ok(ticks) => {
                        for tick in ticks {
                            let idx = worker_index(&tick.stock_code);
                            if senders[idx].send(tick).await.is_err() {
                                tracing::error!(worker = idx, "워커 큐 닫힘");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "틱 읽기 실패 — 5초 후 재시도");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    drop(senders);
    let drain = async {
        for handle in worker_handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        tracing::warn!("워커 드레인 기한 초과");
    }

    let held = monitor.held_count().await;
    tracing::info!(held, "Price Monitor 종료");
    Ok(())
}
