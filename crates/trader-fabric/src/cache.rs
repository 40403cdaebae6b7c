//! 타입 캐시 — JSON 직렬화 레코드 + TTL.

use std::collections::HashMap;
use std::marker::PhantomData;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::FabricError;

/// 단일 키에 레코드 하나를 JSON으로 저장하는 캐시.
///
/// 파싱 실패는 손상 데이터로 간주하여 None을 반환합니다 (경고 로그).
pub struct TypedCache<T> {
    conn: ConnectionManager,
    key: String,
    ttl_secs: Option<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> TypedCache<T> {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
            ttl_secs: None,
            _marker: PhantomData,
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    pub async fn get(&self) -> Result<Option<T>, FabricError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&self.key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %self.key, error = %e, "캐시 파싱 실패");
                Ok(None)
            }
        }
    }

    pub async fn set(&self, value: &T) -> Result<(), FabricError> {
        let data = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        match self.ttl_secs {
            Some(ttl) => {
                let _: () = conn.set_ex(&self.key, data, ttl).await?;
            }
            None => {
                let _: () = conn.set(&self.key, data).await?;
            }
        }
        Ok(())
    }

    pub async fn delete(&self) -> Result<(), FabricError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(&self.key).await?;
        Ok(())
    }

    pub async fn exists(&self) -> Result<bool, FabricError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(&self.key).await?;
        Ok(exists)
    }
}

/// 수동 워치리스트 해시 조회 — {종목코드 → 최소 점수}.
///
/// 운영자가 텔레그램으로 고정한 종목. 파싱 불가 항목은 건너뜁니다.
pub async fn read_manual_overrides(
    conn: &ConnectionManager,
    key: &str,
) -> Result<HashMap<String, f64>, FabricError> {
    let mut conn = conn.clone();
    let raw: HashMap<String, String> = conn.hgetall(key).await?;
    let mut result = HashMap::with_capacity(raw.len());
    for (code, min_score) in raw {
        match min_score.parse::<f64>() {
            Ok(score) => {
                result.insert(code, score);
            }
            Err(_) => {
                warn!(key = %key, code = %code, "수동 워치리스트 항목 파싱 실패, 건너뜀");
            }
        }
    }
    Ok(result)
}
