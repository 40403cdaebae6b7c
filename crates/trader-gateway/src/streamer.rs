//! KIS WebSocket 스트리머 — 실시간 체결가 수신 → `stream:ticks` 발행.
//!
//! # 재연결 규약
//!
//! 재귀 없는 while 루프로 재연결하며, 시도마다 승인키를 새로 발급합니다.
//! 백오프는 지수 증가에 30초 상한. 재연결 성공 시 구독 집합(보유 종목 ∪
//! 활성 워치리스트 — 피어들이 /api/subscribe로 유지)을 전부 재전송합니다.
//!
//! # PINGPONG
//!
//! 서버가 보내는 `tr_id == PINGPONG` 프레임은 수신한 프레임 그대로
//! 에코해야 합니다. 누락하면 약 10초 후 서버가 조용히 연결을 끊습니다.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use trader_core::{PriceTick, StockCode};
use trader_fabric::TypedStreamPublisher;
use trader_notification::{notify, AlertLevel, TelegramSender};

use crate::error::GatewayError;
use crate::kis::auth::KisAuth;
use crate::kis::tr_id;

/// 재연결 백오프 상한 (초).
const MAX_BACKOFF_SECS: u64 = 30;

/// 구독 등록 간격 (ms) — 거래소 권장 0.2초.
const SUBSCRIBE_INTERVAL_MS: u64 = 200;

/// 단절 지속 알림 기준 (초).
const DISCONNECT_ALERT_SECS: u64 = 60;

/// 스트리머 제어 명령.
#[derive(Debug)]
pub enum StreamerCommand {
    /// 공유 구독 집합과 와이어 상태를 동기화
    Sync,
}

/// 피어가 갱신하는 구독 집합 (routes와 공유).
pub type SharedSubscriptions = Arc<Mutex<BTreeSet<StockCode>>>;

pub struct Streamer {
    auth: Arc<KisAuth>,
    publisher: TypedStreamPublisher<PriceTick>,
    cmd_rx: mpsc::Receiver<StreamerCommand>,
    /// 원하는 구독 집합 (피어가 갱신)
    desired: SharedSubscriptions,
    notifier: Option<Arc<TelegramSender>>,
}

impl Streamer {
    pub fn new(
        auth: Arc<KisAuth>,
        publisher: TypedStreamPublisher<PriceTick>,
        desired: SharedSubscriptions,
        notifier: Option<Arc<TelegramSender>>,
    ) -> (Self, mpsc::Sender<StreamerCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        (
            Self {
                auth,
                publisher,
                cmd_rx,
                desired,
                notifier,
            },
            cmd_tx,
        )
    }

    /// 메인 루프 — 프로세스 수명 동안 재연결을 반복합니다.
    pub async fn run(mut self) {
        let mut backoff_secs = 1u64;
        let mut disconnected_since: Option<Instant> = None;
        let mut disconnect_alerted = false;

        loop {
            // 매 시도마다 새 자격증명
            self.auth.clear_websocket_key().await;

            match self.connect_once().await {
                Ok(()) => {
                    // 연결이 성립했다가 끊어진 경우 — 백오프 리셋
                    backoff_secs = 1;
                    disconnected_since = Some(Instant::now());
                    disconnect_alerted = false;
                    warn!("WebSocket 연결 끊김 — 재연결 예정");
                }
                Err(e) => {
                    if disconnected_since.is_none() {
                        disconnected_since = Some(Instant::now());
                    }
                    warn!(error = %e, "WebSocket 연결 실패");
                }
            }

            if let Some(since) = disconnected_since {
                if !disconnect_alerted
                    && since.elapsed() >= Duration::from_secs(DISCONNECT_ALERT_SECS)
                {
                    notify(
                        &self.notifier,
                        AlertLevel::Critical,
                        format!(
                            "실시간 시세 WebSocket이 {}초 이상 단절 — 틱 유입 중단",
                            since.elapsed().as_secs()
                        ),
                    );
                    disconnect_alerted = true;
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
        }
    }

    /// 한 번의 연결 세션. 성립 후 끊어지면 Ok, 성립 실패면 Err.
    async fn connect_once(&mut self) -> Result<(), GatewayError> {
        let approval_key = self.auth.websocket_key().await?;
        let ws_url = self.auth.config().ws_url.clone();

        info!(url = %ws_url, "KIS WebSocket 연결 중");
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| GatewayError::Upstream(format!("WebSocket 연결 실패: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();
        info!("KIS WebSocket 연결 성공");

        // 접속 안정화 대기 후 구독 복원
        tokio::time::sleep(Duration::from_millis(SUBSCRIBE_INTERVAL_MS)).await;

        let mut on_wire: BTreeSet<StockCode> = BTreeSet::new();
        let desired: Vec<StockCode> = self.desired.lock().await.iter().cloned().collect();
        for (i, code) in desired.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(SUBSCRIBE_INTERVAL_MS)).await;
            }
            let frame = subscribe_frame(&approval_key, code, true);
            write
                .send(Message::Text(frame))
                .await
                .map_err(|e| GatewayError::Upstream(e.to_string()))?;
            on_wire.insert(code.clone());
            debug!(stock_code = %code, "구독 복원");
        }
        info!(count = on_wire.len(), "구독 전송 완료");

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(echo) = self.handle_text(&text).await {
                                // PINGPONG: 수신 프레임 그대로 에코
                                if let Err(e) = write.send(Message::Text(echo)).await {
                                    error!(error = %e, "PINGPONG 에코 실패");
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("서버 연결 종료 요청");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket 수신 에러");
                            return Ok(());
                        }
                        None => {
                            warn!("WebSocket 스트림 종료");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    match cmd {
                        StreamerCommand::Sync => {
                            let desired: BTreeSet<StockCode> =
                                self.desired.lock().await.iter().cloned().collect();

                            let added: Vec<StockCode> =
                                desired.difference(&on_wire).cloned().collect();
                            let removed: Vec<StockCode> =
                                on_wire.difference(&desired).cloned().collect();

                            for code in added {
                                let frame = subscribe_frame(&approval_key, &code, true);
                                if write.send(Message::Text(frame)).await.is_err() {
                                    return Ok(());
                                }
                                info!(stock_code = %code, "동적 구독");
                                on_wire.insert(code);
                                tokio::time::sleep(
                                    Duration::from_millis(SUBSCRIBE_INTERVAL_MS),
                                ).await;
                            }
                            for code in removed {
                                let frame = subscribe_frame(&approval_key, &code, false);
                                if write.send(Message::Text(frame)).await.is_err() {
                                    return Ok(());
                                }
                                info!(stock_code = %code, "동적 구독 해제");
                                on_wire.remove(&code);
                                tokio::time::sleep(
                                    Duration::from_millis(SUBSCRIBE_INTERVAL_MS),
                                ).await;
                            }
                        }
                    }
                }
            }
        }
    }

    /// 텍스트 프레임 처리. PINGPONG이면 에코할 원문을 반환.
    async fn handle_text(&self, text: &str) -> Option<String> {
        // JSON 프레임: PINGPONG 또는 구독 응답
        if text.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                let frame_tr = value["header"]["tr_id"].as_str().unwrap_or("");
                if frame_tr == "PINGPONG" {
                    debug!("PINGPONG 수신 — 에코");
                    return Some(text.to_string());
                }
                debug!(tr_id = %frame_tr, "KIS 제어 프레임");
            }
            return None;
        }

        // 체결 데이터: '0'|'1'로 시작, '|' 구분, 필드는 '^' 구분
        if !text.starts_with('0') && !text.starts_with('1') {
            return None;
        }
        if let Some(tick) = parse_tick(text) {
            if let Err(e) = self.publisher.publish(&tick).await {
                error!(error = %e, stock_code = %tick.stock_code, "틱 발행 실패");
            }
        }
        None
    }
}

/// 구독/해제 요청 프레임.
fn subscribe_frame(approval_key: &str, code: &StockCode, subscribe: bool) -> String {
    json!({
        "header": {
            "approval_key": approval_key,
            "custtype": "P",
            "tr_type": if subscribe { "1" } else { "2" },
            "content-type": "utf-8",
        },
        "body": {
            "input": {
                "tr_id": tr_id::WS_TRADE,
                "tr_key": code.as_str(),
            }
        }
    })
    .to_string()
}

/// 체결 프레임 → PriceTick 디코드.
///
/// `암호화여부|TR_ID|데이터건수|데이터` 형식이며 데이터는 `^` 구분.
/// 필드: [0]=종목코드, [2]=체결가, [10]=체결거래량.
fn parse_tick(message: &str) -> Option<PriceTick> {
    let parts: Vec<&str> = message.split('|').collect();
    if parts.len() < 4 {
        return None;
    }
    let fields: Vec<&str> = parts[3].split('^').collect();
    if fields.len() < 6 {
        return None;
    }

    let stock_code = StockCode::new(fields[0]).ok()?;
    let price = Decimal::from_str(fields[2]).ok()?;
    if price <= Decimal::ZERO {
        return None;
    }
    let volume = fields
        .get(10)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);

    Some(PriceTick {
        stock_code,
        price,
        volume,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_tick_frame() {
        // 필드: [0]=코드, [2]=체결가, [10]=체결거래량
        let msg = "0|H0STCNT0|001|005930^093015^72100^2^100^0.14^71900^72000^72150^71900^355^72050^1234567^89012345678";
        let tick = parse_tick(msg).unwrap();
        assert_eq!(tick.stock_code.as_str(), "005930");
        assert_eq!(tick.price, dec!(72100));
        assert_eq!(tick.volume, 355);
    }

    #[test]
    fn parse_rejects_malformed_frames() {
        assert!(parse_tick("0|H0STCNT0|001").is_none());
        assert!(parse_tick("0|H0STCNT0|001|BADCODE^1^2^3^4^5").is_none());
        assert!(parse_tick("garbage").is_none());
    }

    #[test]
    fn subscribe_frame_shape() {
        let code = StockCode::new("005930").unwrap();
        let frame = subscribe_frame("key-123", &code, true);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["header"]["tr_type"], "1");
        assert_eq!(value["body"]["input"]["tr_key"], "005930");
        assert_eq!(value["body"]["input"]["tr_id"], "H0STCNT0");

        let frame = subscribe_frame("key-123", &code, false);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["header"]["tr_type"], "2");
    }
}
