//! KIS OAuth — 접근 토큰 파일 캐시 + WebSocket 승인키.
//!
//! KIS는 토큰 발급 자체를 전역 레이트 리밋합니다(1분 1회 수준).
//! 토큰은 영속 볼륨의 파일에 캐시하고, 프로세스 재시작 시 재사용하여
//! 발급 한도를 아낍니다. 갱신은 만료 5분 전 이내일 때만 수행합니다.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use trader_core::config::KisConfig;

use crate::error::GatewayError;

/// 만료 전 갱신 여유 (초) — 5분.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// WebSocket 승인키 캐시 시간 (초).
const APPROVAL_KEY_CACHE_SECS: i64 = 30;

#[derive(Debug, Serialize, Deserialize, Clone)]
struct CachedToken {
    access_token: String,
    /// epoch 초
    expires_at: i64,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Utc::now().timestamp() < self.expires_at - TOKEN_REFRESH_MARGIN_SECS
    }
}

struct ApprovalKey {
    key: String,
    fetched_at: i64,
}

/// 토큰/승인키 발급 및 캐싱.
pub struct KisAuth {
    config: KisConfig,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
    approval: Mutex<Option<ApprovalKey>>,
}

impl KisAuth {
    pub fn new(config: KisConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            token: Mutex::new(None),
            approval: Mutex::new(None),
        }
    }

    fn token_path(&self) -> PathBuf {
        PathBuf::from(&self.config.token_file_path)
    }

    /// 기동 시 캐시 파일에서 토큰 로드.
    pub async fn load_cached_token(&self) {
        let path = self.token_path();
        let Ok(raw) = tokio::fs::read_to_string(&path).await else {
            return;
        };
        match serde_json::from_str::<CachedToken>(&raw) {
            Ok(cached) if cached.is_valid() => {
                info!(
                    expires_at = cached.expires_at,
                    "캐시된 KIS 토큰 로드"
                );
                *self.token.lock().await = Some(cached);
            }
            Ok(_) => debug!("캐시된 토큰 만료 임박 — 재발급 예정"),
            Err(e) => warn!(error = %e, "토큰 캐시 파일 파싱 실패"),
        }
    }

    /// 유효한 접근 토큰 반환. 만료 5분 전 이내이면 재발급.
    pub async fn bearer_token(&self) -> Result<String, GatewayError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.is_valid() {
                return Ok(cached.access_token.clone());
            }
        }

        let resp = self
            .http
            .post(format!("{}/oauth2/tokenP", self.config.base_url))
            .json(&json!({
                "grant_type": "client_credentials",
                "appkey": self.config.app_key,
                "appsecret": self.config.app_secret,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GatewayError::Auth(format!(
                "토큰 발급 실패: HTTP {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Auth("토큰 응답에 access_token 없음".to_string()))?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .unwrap_or(86_400);

        let cached = CachedToken {
            access_token: access_token.clone(),
            expires_at: Utc::now().timestamp() + expires_in,
        };
        self.save_token_file(&cached).await;
        info!(expires_in, "KIS 토큰 갱신");
        *guard = Some(cached);

        Ok(access_token)
    }

    async fn save_token_file(&self, token: &CachedToken) {
        let path = self.token_path();
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match serde_json::to_string(token) {
            Ok(data) => {
                if let Err(e) = tokio::fs::write(&path, data).await {
                    warn!(error = %e, path = %path.display(), "토큰 캐시 저장 실패");
                }
            }
            Err(e) => warn!(error = %e, "토큰 직렬화 실패"),
        }
    }

    /// WebSocket 접속 승인키. 30초 캐시.
    pub async fn websocket_key(&self) -> Result<String, GatewayError> {
        let mut guard = self.approval.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Utc::now().timestamp() - cached.fetched_at < APPROVAL_KEY_CACHE_SECS {
                return Ok(cached.key.clone());
            }
        }

        let resp = self
            .http
            .post(format!("{}/oauth2/Approval", self.config.base_url))
            .json(&json!({
                "grant_type": "client_credentials",
                "appkey": self.config.app_key,
                "secretkey": self.config.app_secret,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GatewayError::Auth(format!(
                "승인키 발급 실패: HTTP {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        let key = body
            .get("approval_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Auth("승인키 응답 비어 있음".to_string()))?
            .to_string();

        *guard = Some(ApprovalKey {
            key: key.clone(),
            fetched_at: Utc::now().timestamp(),
        });
        Ok(key)
    }

    /// 승인키 캐시 무효화 — 재연결 시 새 키 발급 유도.
    pub async fn clear_websocket_key(&self) {
        *self.approval.lock().await = None;
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }
}
