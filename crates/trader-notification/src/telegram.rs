//! 텔레그램 알림 전송.
//!
//! 운영자가 보는 이벤트(§운영 가시성):
//! - 주문 확인(confirmation) 실패
//! - 서킷 브레이커 2분 이상 OPEN
//! - WebSocket 60초 이상 단절
//! - 장중 증권사 주문 거부

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use trader_core::config::TelegramConfig;

/// 알림 심각도.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    fn emoji(self) -> &'static str {
        match self {
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Critical => "🚨",
        }
    }
}

/// 텔레그램 Bot API 전송기.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    /// 설정에서 전송기 생성. 비활성화(토큰/채팅 ID 없음)면 None.
    pub fn from_config(config: TelegramConfig) -> Option<Arc<Self>> {
        if !config.enabled {
            return None;
        }
        Some(Arc::new(Self {
            config,
            client: reqwest::Client::new(),
        }))
    }

    /// 알림 전송. 실패는 경고 로그로만 남깁니다.
    pub async fn send(&self, level: AlertLevel, text: &str) {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );
        let body = json!({
            "chat_id": self.config.chat_id,
            "text": format!("{} {}", level.emoji(), text),
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("텔레그램 알림 전송 완료");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "텔레그램 알림 거부됨");
            }
            Err(e) => {
                warn!(error = %e, "텔레그램 알림 전송 실패");
            }
        }
    }

    /// fire-and-forget 전송 — 호출 경로를 블로킹하지 않음.
    pub fn send_detached(self: &Arc<Self>, level: AlertLevel, text: String) {
        let sender = Arc::clone(self);
        tokio::spawn(async move {
            sender.send(level, &text).await;
        });
    }
}

/// 알림이 설정되지 않았을 수도 있는 핸들에 대한 편의 전송.
pub fn notify(sender: &Option<Arc<TelegramSender>>, level: AlertLevel, text: String) {
    if let Some(sender) = sender {
        sender.send_detached(level, text);
    }
}
