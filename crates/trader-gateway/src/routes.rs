//! Gateway HTTP 표면 (axum).
//!
//! 모든 아웃바운드 호출은 토큰 버킷(19/s) → 엔드포인트별 브레이커 순으로
//! 통과합니다. 에러 응답은 `{error, detail, service, timestamp}` 형식.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;

use trader_core::krx::session_at;
use trader_core::{OrderRequest, StockCode, TradeType};

use crate::breaker::CircuitBreaker;
use crate::error::GatewayError;
use crate::kis::KisClient;
use crate::ratelimit::TokenBucket;
use crate::streamer::{SharedSubscriptions, StreamerCommand};

const SERVICE_NAME: &str = "kis-gateway";

/// 핸들러 공유 상태.
pub struct AppState {
    pub kis: KisClient,
    pub bucket: TokenBucket,
    pub breaker: CircuitBreaker,
    pub subscriptions: SharedSubscriptions,
    pub streamer_tx: mpsc::Sender<StreamerCommand>,
    pub rate_timeout: Duration,
}

/// HTTP 에러 응답 래퍼.
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": self.0.code(),
            "detail": self.0.to_string(),
            "service": SERVICE_NAME,
            "timestamp": Utc::now().to_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}

/// 토큰 버킷 + 브레이커를 통과하는 공통 경로.
///
/// 업무 오류(4xx)는 브레이커에 집계하지 않습니다 — 업스트림이 살아있다는
/// 증거이므로 연속 실패 카운트를 끊습니다.
async fn guarded<T, Fut>(
    state: &AppState,
    endpoint: &'static str,
    fut: Fut,
) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    if !state.bucket.acquire(state.rate_timeout).await {
        return Err(GatewayError::RateLimited);
    }
    state.breaker.check(endpoint).await?;

    match fut.await {
        Ok(value) => {
            state.breaker.record_success(endpoint).await;
            Ok(value)
        }
        Err(e) => {
            if e.is_transport() {
                state.breaker.record_failure(endpoint).await;
            } else {
                state.breaker.record_success(endpoint).await;
            }
            Err(e)
        }
    }
}

// ==================== 요청 DTO ====================

#[derive(Debug, Deserialize)]
struct SnapshotRequest {
    stock_code: StockCode,
}

#[derive(Debug, Deserialize)]
struct DailyPricesRequest {
    stock_code: StockCode,
    #[serde(default = "default_days")]
    days: usize,
}

fn default_days() -> usize {
    150
}

#[derive(Debug, Deserialize)]
struct MinutePricesRequest {
    stock_code: StockCode,
    #[serde(default = "default_count")]
    count: usize,
}

fn default_count() -> usize {
    30
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    order_no: String,
}

#[derive(Debug, Deserialize)]
struct OrderStatusRequest {
    order_no: String,
}

#[derive(Debug, Deserialize)]
struct TradingDayQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    codes: Vec<StockCode>,
}

// ==================== 시세 ====================

async fn market_snapshot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SnapshotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = guarded(&state, "snapshot", state.kis.get_snapshot(&req.stock_code)).await?;
    Ok(Json(snapshot))
}

async fn market_daily_prices(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DailyPricesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.days == 0 || req.days > 500 {
        return Err(GatewayError::Validation(format!("days 범위 초과: {}", req.days)).into());
    }
    let prices = guarded(
        &state,
        "daily-prices",
        state.kis.get_daily_prices(&req.stock_code, req.days),
    )
    .await?;
    Ok(Json(prices))
}

async fn market_minute_prices(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MinutePricesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let prices = guarded(
        &state,
        "minute-prices",
        state.kis.get_minute_prices(&req.stock_code, req.count),
    )
    .await?;
    Ok(Json(prices))
}

async fn market_is_open() -> impl IntoResponse {
    let now = trader_core::time::kst_now();
    let session = session_at(now.time());
    Json(json!({
        "open": session.is_open(),
        "session": session.as_str(),
    }))
}

async fn market_is_trading_day(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TradingDayQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let target = match query.date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
            GatewayError::Validation(format!("날짜 형식 오류 (YYYY-MM-DD): {}", raw))
        })?,
        None => trader_core::time::kst_now().date_naive(),
    };
    let trading = guarded(&state, "trading-day", state.kis.is_trading_day(target)).await?;
    Ok(Json(json!({ "trading": trading })))
}

// ==================== 주문 ====================

/// 매수/매도 공통. 업무 오류는 success=false OrderResult로 전달.
async fn place_order(
    state: &AppState,
    trade_type: TradeType,
    order: OrderRequest,
) -> Result<Json<trader_core::OrderResult>, ApiError> {
    let result = guarded(state, "order", state.kis.place_order(trade_type, &order)).await;
    match result {
        Ok(result) => Ok(Json(result)),
        Err(GatewayError::Business { code, message }) => {
            info!(
                stock_code = %order.stock_code,
                code = %code,
                message = %message,
                "주문 업무 거부"
            );
            Ok(Json(trader_core::OrderResult {
                success: false,
                order_no: None,
                stock_code: order.stock_code,
                quantity: order.quantity,
                filled_quantity: 0,
                avg_fill_price: None,
                message: Some(format!("[{}] {}", code, message)),
            }))
        }
        Err(e) => Err(e.into()),
    }
}

async fn trading_buy(
    State(state): State<Arc<AppState>>,
    Json(order): Json<OrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    place_order(&state, TradeType::Buy, order).await
}

async fn trading_sell(
    State(state): State<Arc<AppState>>,
    Json(order): Json<OrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    place_order(&state, TradeType::Sell, order).await
}

async fn trading_cancel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let success = guarded(&state, "cancel", state.kis.cancel_order(&req.order_no)).await?;
    Ok(Json(json!({ "success": success })))
}

async fn trading_order_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = guarded(
        &state,
        "order-status",
        state.kis.order_status(&req.order_no),
    )
    .await?;
    Ok(Json(status))
}

// ==================== 계좌 ====================

async fn account_balance(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = guarded(&state, "balance", state.kis.get_balance()).await?;
    Ok(Json(balance))
}

async fn account_cash(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let buying_power = guarded(&state, "cash", state.kis.get_buying_power()).await?;
    Ok(Json(json!({ "buying_power": buying_power })))
}

// ==================== 구독 ====================

async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscribeRequest>,
) -> impl IntoResponse {
    let total = {
        let mut subs = state.subscriptions.lock().await;
        for code in req.codes {
            subs.insert(code);
        }
        subs.len()
    };
    // 스트리머가 잠시 단절 상태면 재연결 시 전체 재전송되므로 nudge 실패는 무해
    let _ = state.streamer_tx.try_send(StreamerCommand::Sync);
    Json(json!({ "total_subscriptions": total }))
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscribeRequest>,
) -> impl IntoResponse {
    let total = {
        let mut subs = state.subscriptions.lock().await;
        for code in &req.codes {
            subs.remove(code);
        }
        subs.len()
    };
    let _ = state.streamer_tx.try_send(StreamerCommand::Sync);
    Json(json!({ "total_subscriptions": total }))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 라우터 구성.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/market/snapshot", post(market_snapshot))
        .route("/api/market/daily-prices", post(market_daily_prices))
        .route("/api/market/minute-prices", post(market_minute_prices))
        .route("/api/market/is-market-open", get(market_is_open))
        .route("/api/market/is-trading-day", get(market_is_trading_day))
        .route("/api/trading/buy", post(trading_buy))
        .route("/api/trading/sell", post(trading_sell))
        .route("/api/trading/cancel", post(trading_cancel))
        .route("/api/trading/order-status", post(trading_order_status))
        .route("/api/account/balance", post(account_balance))
        .route("/api/account/cash", post(account_cash))
        .route("/api/subscribe", post(subscribe))
        .route("/api/unsubscribe", post(unsubscribe))
        .route("/health", get(health))
        .with_state(state)
}
