//! KIS Gateway 서비스 엔트리포인트.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trader_core::AppConfig;
use trader_fabric::{keys, TypedStreamPublisher};
use trader_gateway::kis::{KisAuth, KisClient};
use trader_gateway::routes::{router, AppState};
use trader_gateway::{CircuitBreaker, Streamer, TokenBucket};
use trader_notification::{notify, AlertLevel, TelegramSender};

/// 브레이커 장기 OPEN 알림 기준 (2분).
const BREAKER_ALERT_AGE: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trader_gateway=info,trader_fabric=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        paper = config.kis.is_paper,
        rate_limit = config.gateway.rate_limit_per_sec,
        "KIS Gateway 시작"
    );

    let redis = trader_fabric::connect(&config.redis.url).await?;
    let notifier = TelegramSender::from_config(config.telegram.clone());

    // 업스트림 HTTP 클라이언트 (5초 타임아웃)
    let http = reqwest::Client::builder()
        .timeout(config.gateway.upstream_timeout)
        .build()?;

    // 토큰 사전 발급 — 장중 첫 요청 지연 방지
    let auth = Arc::new(KisAuth::new(config.kis.clone(), http.clone()));
    auth.load_cached_token().await;
    match auth.bearer_token().await {
        Ok(_) => tracing::info!("KIS 토큰 사전 발급 완료"),
        Err(e) => tracing::warn!(error = %e, "KIS 사전 인증 실패 (첫 요청에서 재시도)"),
    }

    // WebSocket 스트리머
    let subscriptions = Arc::new(Mutex::new(BTreeSet::new()));
    let tick_publisher = TypedStreamPublisher::new(redis.clone(), keys::STREAM_TICKS);
    let (streamer, streamer_tx) = Streamer::new(
        Arc::clone(&auth),
        tick_publisher,
        Arc::clone(&subscriptions),
        notifier.clone(),
    );
    tokio::spawn(streamer.run());

    let state = Arc::new(AppState {
        kis: KisClient::new(Arc::clone(&auth), http),
        bucket: TokenBucket::new(config.gateway.rate_limit_per_sec),
        breaker: CircuitBreaker::new(
            config.gateway.breaker_failure_threshold,
            config.gateway.breaker_window,
            config.gateway.breaker_open_duration,
        ),
        subscriptions,
        streamer_tx,
        rate_timeout: config.gateway.rate_acquire_timeout,
    });

    // 브레이커 장기 OPEN 감시 (2분 초과 시 운영자 알림, 엔드포인트당 1회)
    {
        let state = Arc::clone(&state);
        let notifier = notifier.clone();
        tokio::spawn(async move {
            let mut alerted: HashSet<String> = HashSet::new();
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let long_open = state.breaker.long_open_endpoints(BREAKER_ALERT_AGE).await;
                for endpoint in long_open {
                    if alerted.insert(endpoint.clone()) {
                        notify(
                            &notifier,
                            AlertLevel::Critical,
                            format!("서킷 브레이커 {}이(가) 2분 이상 OPEN — KIS 장애 의심", endpoint),
                        );
                    }
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&config.gateway.bind_addr).await?;
    tracing::info!(addr = %config.gateway.bind_addr, "HTTP 서버 리스닝");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("종료 신호 수신");
        })
        .await?;

    tracing::info!("KIS Gateway 종료");
    Ok(())
}
