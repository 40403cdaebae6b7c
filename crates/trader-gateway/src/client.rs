//! Gateway HTTP 클라이언트 — 피어 서비스용.
//!
//! Scanner/Monitor/Executor는 증권사를 직접 호출하지 않고 이 클라이언트로
//! Gateway를 경유합니다. 기본 타임아웃 5초.

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use trader_core::{
    DailyPrice, MinutePrice, OrderRequest, OrderResult, OrderStatus, PortfolioState, StockCode,
    StockSnapshot,
};

/// Gateway 호출 에러.
#[derive(Debug, Error)]
pub enum GatewayClientError {
    /// 타임아웃/연결 실패/503 — 브레이커 OPEN 포함. 재시도 대상.
    #[error("Gateway 전송 오류: {0}")]
    Transport(String),

    /// 토큰 버킷 고갈 (429). 일시적 — 재시도 대상.
    #[error("RATE_LIMITED")]
    RateLimited,

    /// Gateway가 요청을 거부 (400/404/409 — 검증/업무 오류)
    #[error("Gateway 거부 [{status}]: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("응답 디코드 실패: {0}")]
    Decode(String),
}

impl GatewayClientError {
    /// 재전달(pending 복구)로 처리할 일시적 오류인지.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited)
    }
}

impl From<reqwest::Error> for GatewayClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct MarketOpenResponse {
    pub open: bool,
    pub session: String,
}

#[derive(Debug, Deserialize)]
struct TradingDayResponse {
    trading: bool,
}

#[derive(Debug, Deserialize)]
struct CashResponse {
    buying_power: Decimal,
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    success: bool,
}

/// Gateway REST 클라이언트.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GatewayClientError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await?;
        self.decode(resp).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayClientError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;
        self.decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, GatewayClientError> {
        let status = resp.status();

        if status.as_u16() == 429 {
            return Err(GatewayClientError::RateLimited);
        }
        if status.is_server_error() || status.as_u16() == 503 {
            let detail = resp
                .json::<ErrorBody>()
                .await
                .map(|b| format!("{}: {}", b.error, b.detail))
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(GatewayClientError::Transport(detail));
        }
        if !status.is_success() {
            let detail = resp
                .json::<ErrorBody>()
                .await
                .map(|b| format!("{}: {}", b.error, b.detail))
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(GatewayClientError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| GatewayClientError::Decode(e.to_string()))
    }

    // ==================== 시세 ====================

    pub async fn snapshot(&self, code: &StockCode) -> Result<StockSnapshot, GatewayClientError> {
        self.post_json("/api/market/snapshot", json!({ "stock_code": code }))
            .await
    }

    pub async fn daily_prices(
        &self,
        code: &StockCode,
        days: usize,
    ) -> Result<Vec<DailyPrice>, GatewayClientError> {
        self.post_json(
            "/api/market/daily-prices",
            json!({ "stock_code": code, "days": days }),
        )
        .await
    }

    pub async fn minute_prices(
        &self,
        code: &StockCode,
        count: usize,
    ) -> Result<Vec<MinutePrice>, GatewayClientError> {
        self.post_json(
            "/api/market/minute-prices",
            json!({ "stock_code": code, "count": count }),
        )
        .await
    }

    /// 장 운영 여부 — (open, session).
    pub async fn is_market_open(&self) -> Result<(bool, String), GatewayClientError> {
        let resp: MarketOpenResponse = self.get_json("/api/market/is-market-open", &[]).await?;
        Ok((resp.open, resp.session))
    }

    pub async fn is_trading_day(&self, date: NaiveDate) -> Result<bool, GatewayClientError> {
        let resp: TradingDayResponse = self
            .get_json(
                "/api/market/is-trading-day",
                &[("date", date.format("%Y-%m-%d").to_string())],
            )
            .await?;
        Ok(resp.trading)
    }

    // ==================== 주문 ====================

    pub async fn buy(&self, order: &OrderRequest) -> Result<OrderResult, GatewayClientError> {
        self.post_json("/api/trading/buy", serde_json::to_value(order).unwrap_or_default())
            .await
    }

    pub async fn sell(&self, order: &OrderRequest) -> Result<OrderResult, GatewayClientError> {
        self.post_json("/api/trading/sell", serde_json::to_value(order).unwrap_or_default())
            .await
    }

    pub async fn cancel(&self, order_no: &str) -> Result<bool, GatewayClientError> {
        let resp: CancelResponse = self
            .post_json("/api/trading/cancel", json!({ "order_no": order_no }))
            .await?;
        Ok(resp.success)
    }

    pub async fn order_status(&self, order_no: &str) -> Result<OrderStatus, GatewayClientError> {
        self.post_json("/api/trading/order-status", json!({ "order_no": order_no }))
            .await
    }

    // ==================== 계좌 ====================

    pub async fn balance(&self) -> Result<PortfolioState, GatewayClientError> {
        self.post_json("/api/account/balance", json!({})).await
    }

    pub async fn buying_power(&self) -> Result<Decimal, GatewayClientError> {
        let resp: CashResponse = self.post_json("/api/account/cash", json!({})).await?;
        Ok(resp.buying_power)
    }

    // ==================== 구독 ====================

    pub async fn subscribe(&self, codes: &[StockCode]) -> Result<(), GatewayClientError> {
        let _: serde_json::Value = self
            .post_json("/api/subscribe", json!({ "codes": codes }))
            .await?;
        Ok(())
    }

    pub async fn unsubscribe(&self, codes: &[StockCode]) -> Result<(), GatewayClientError> {
        let _: serde_json::Value = self
            .post_json("/api/unsubscribe", json!({ "codes": codes }))
            .await?;
        Ok(())
    }
}
