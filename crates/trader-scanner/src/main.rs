//! Buy Scanner 서비스 엔트리포인트.
//!
//! 리더 1 태스크가 `stream:ticks`에서 최대 100건씩 읽어(ACK 우선)
//! 코드 해시로 워커 4개에 분배합니다. 5분마다 워치리스트를 다시 읽고
//! Gateway 구독을 정렬합니다.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trader_core::time::kst_now;
use trader_core::{AppConfig, PriceTick, StockCode, TradingContext};
use trader_fabric::{keys, Cooldowns, DailyBuyCounter, TypedCache, TypedStreamConsumer, TypedStreamPublisher};
use trader_gateway::GatewayClient;
use trader_scanner::gates::RiskGates;
use trader_scanner::scanner::{reload_watch_set, ScannerShared, ScannerWorker};

/// 워커 수.
const WORKER_COUNT: usize = 4;

/// 워커 큐 총 용량 (워커당 분할).
const QUEUE_CAPACITY: usize = 1_000;

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
                .unwrap_or_else(|_| "trader_scanner=info,trader_fabric=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Buy Scanner 시작");

    let redis = trader_fabric::connect(&config.redis.url).await?;
    let gateway = GatewayClient::new(config.kis.gateway_url.clone());

    let watchlist_cache: TypedCache<trader_core::HotWatchlist> =
        TypedCache::new(redis.clone(), keys::CACHE_WATCHLIST);
    let context_cache: TypedCache<TradingContext> =
        TypedCache::new(redis.clone(), keys::CACHE_TRADING_CONTEXT);

    let shared = Arc::new(ScannerShared::new(TradingContext::fallback(
        kst_now().date_naive(),
    )));

    // 최초 로드 + 구독
    let subscribed: Arc<RwLock<BTreeSet<StockCode>>> = Arc::new(RwLock::new(BTreeSet::new()));
    match reload_watch_set(&shared, &watchlist_cache, keys::CACHE_MANUAL_WATCHLIST, &redis).await {
        Ok(codes) => {
            tracing::info!(count = codes.len(), "워치리스트 로드");
            if !codes.is_empty() {
                if let Err(e) = gateway.subscribe(&codes).await {
                    tracing::warn!(error = %e, "Gateway 구독 실패 (기존 피드 사용)");
                }
                *subscribed.write().await = codes.into_iter().collect();
            }
        }
        Err(e) => tracing::warn!(error = %e, "워치리스트 최초 로드 실패"),
    }
    if let Ok(Some(ctx)) = context_cache.get().await {
        *shared.context.write().await = ctx;
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // 워커 기동
    let mut senders: Vec<mpsc::Sender<PriceTick>> = Vec::with_capacity(WORKER_COUNT);
    let mut worker_handles = Vec::with_capacity(WORKER_COUNT);
    for worker_id in 0..WORKER_COUNT {
        let (tx, mut rx) = mpsc::channel::<PriceTick>(QUEUE_CAPACITY / WORKER_COUNT);
        senders.push(tx);

        let mut worker = ScannerWorker::new(
            worker_id,
            Arc::clone(&shared),
            RiskGates::new(
                Cooldowns::new(redis.clone()),
                DailyBuyCounter::new(redis.clone()),
            ),
            TypedStreamPublisher::new(redis.clone(), keys::STREAM_BUY_SIGNALS),
            config.scanner.clone(),
            config.risk.clone(),
        );

        worker_handles.push(tokio::spawn(async move {
            // 송신자가 모두 닫히면 큐 드레인 후 종료
            while let Some(tick) = rx.recv().await {
                worker.process_tick(tick).await;
            }
            let (cooldowns, pending) = worker.status();
            tracing::info!(worker_id, cooldowns, pending, "워커 종료");
        }));
    }

    // 주기 리로더 — 워치리스트/컨텍스트 재적재 + 구독 정렬
    {
        let shared = Arc::clone(&shared);
        let gateway = gateway.clone();
        let redis = redis.clone();
        let subscribed = Arc::clone(&subscribed);
        let reload_secs = config.scanner.watchlist_reload_secs;
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let watchlist_cache: TypedCache<trader_core::HotWatchlist> =
                TypedCache::new(redis.clone(), keys::CACHE_WATCHLIST);
            let context_cache: TypedCache<TradingContext> =
                TypedCache::new(redis.clone(), keys::CACHE_TRADING_CONTEXT);
            let mut interval = tokio::time::interval(Duration::from_secs(reload_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        match reload_watch_set(
                            &shared,
                            &watchlist_cache,
                            keys::CACHE_MANUAL_WATCHLIST,
                            &redis,
                        )
                        .await
                        {
                            Ok(codes) => {
                                let desired: BTreeSet<StockCode> = codes.into_iter().collect();
                                let mut current = subscribed.write().await;
                                if desired != *current {
                                    let added: Vec<StockCode> =
                                        desired.difference(&current).cloned().collect();
                                    let removed: Vec<StockCode> =
                                        current.difference(&desired).cloned().collect();
                                    tracing::info!(
                                        added = added.len(),
                                        removed = removed.len(),
                                        "감시 집합 변경 — 구독 정렬"
                                    );
                                    if !added.is_empty() {
                                        if let Err(e) = gateway.subscribe(&added).await {
                                            tracing::warn!(error = %e, "구독 추가 실패");
                                        }
                                    }
                                    if !removed.is_empty() {
                                        if let Err(e) = gateway.unsubscribe(&removed).await {
                                            tracing::warn!(error = %e, "구독 해제 실패");
                                        }
                                    }
                                    *current = desired;
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "워치리스트 리로드 실패"),
                        }

                        if let Ok(Some(ctx)) = context_cache.get().await {
                            *shared.context.write().await = ctx;
                        }
                    }
                }
            }
        });
    }

    // 리더 — 틱 소비 (ACK 우선, at-most-once)
    let consumer: TypedStreamConsumer<PriceTick> = TypedStreamConsumer::new(
        redis.clone(),
        keys::STREAM_TICKS,
        keys::GROUP_SCANNER,
        format!("scanner-{}", std::process::id()),
    )
    .await?;

    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut tick_count: u64 = 0;
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
                            // 큐 포화 시 backpressure — 리더가 대기
                            if senders[idx].send(tick).await.is_err() {
                                tracing::error!(worker = idx, "워커 큐 닫힘");
                            }
                            tick_count += 1;
                        }
                        if tick_count > 0 && tick_count % 10_000 == 0 {
                            tracing::info!(tick_count, "틱 처리 누계");
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

    // 워커 큐 드레인 (10초 기한)
    drop(senders);
    let drain = async {
        for handle in worker_handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        tracing::warn!("워커 드레인 기한 초과");
    }

    tracing::info!(tick_count, "Buy Scanner 종료");
    Ok(())
}
