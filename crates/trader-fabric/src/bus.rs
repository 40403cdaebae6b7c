//! 타입 메시지 버스 — Redis Streams + consumer group.
//!
//! # 설계
//!
//! - Publisher: 레코드 → JSON → 단일 `payload` 필드 XADD (MAXLEN ≈ 100,000)
//! - Consumer: XREADGROUP 배치(≤100) → JSON 파싱 → 호출자 처리
//! - 전달 보장: **at-most-once**. 틱 소비자는 디코드 즉시 ACK하고
//!   ([`TypedStreamConsumer::next_records_ack_first`]), 실행기는 처리 결과에
//!   따라 `ack`를 호출하거나 보류합니다 (증권사 전송 오류만 ACK을 미뤄
//!   pending 복구로 재전달).
//! - 손상 payload: ACK 후 dead-letter 스트림에 기록, 알림 없음
//! - Pending 복구: 60초 주기로 XPENDING 스캔, 300초 이상 유휴 메시지를
//!   XCLAIM하여 재처리

use std::marker::PhantomData;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamMaxlen, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::FabricError;
use crate::keys::{STREAM_DEAD_LETTER, STREAM_MAXLEN};

/// 기동 시 Redis 준비 대기 한도 (초).
const STARTUP_RETRY_SECS: u32 = 30;

/// Pending 복구 대상 최소 유휴 시간 (ms).
pub const PENDING_MIN_IDLE_MS: u64 = 300_000;

/// Pending 스캔 주기 (초).
pub const PENDING_SCAN_INTERVAL_SECS: u64 = 60;

/// 파싱 전 원시 메시지.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub payload: Option<String>,
}

/// 레코드를 Redis Stream에 발행.
pub struct TypedStreamPublisher<T> {
    conn: ConnectionManager,
    stream: String,
    maxlen: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T: Serialize> TypedStreamPublisher<T> {
    pub fn new(conn: ConnectionManager, stream: impl Into<String>) -> Self {
        Self {
            conn,
            stream: stream.into(),
            maxlen: STREAM_MAXLEN,
            _marker: PhantomData,
        }
    }

    pub fn with_maxlen(mut self, maxlen: usize) -> Self {
        self.maxlen = maxlen;
        self
    }

    /// 메시지 발행. 반환값: 메시지 ID.
    pub async fn publish(&self, message: &T) -> Result<String, FabricError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd_maxlen(
                &self.stream,
                StreamMaxlen::Approx(self.maxlen),
                "*",
                &[("payload", payload.as_str())],
            )
            .await?;
        debug!(stream = %self.stream, id = %id, "메시지 발행");
        Ok(id)
    }
}

/// Redis Stream 소비자 — consumer group 기반.
pub struct TypedStreamConsumer<T> {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    batch_size: usize,
    block_ms: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedStreamConsumer<T> {
    /// Consumer group을 보장하며 생성.
    ///
    /// Redis가 준비되지 않았으면(BUSY LOADING / 연결 거부) 최대 30초
    /// 재시도 후 실패를 반환합니다.
    pub async fn new(
        conn: ConnectionManager,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, FabricError> {
        let stream = stream.into();
        let group = group.into();
        let consumer = consumer.into();

        ensure_group(&conn, &stream, &group).await?;
        info!(stream = %stream, group = %group, consumer = %consumer, "소비자 준비 완료");

        Ok(Self {
            conn,
            stream,
            group,
            consumer,
            batch_size: 100,
            block_ms: 2_000,
            _marker: PhantomData,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// 새 메시지 배치 읽기 (블로킹 최대 block_ms). ACK하지 않습니다.
    pub async fn fetch(&self) -> Result<Vec<RawMessage>, FabricError> {
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(self.batch_size)
            .block(self.block_ms as usize);

        let mut conn = self.conn.clone();
        let reply: StreamReadReply = conn
            .xread_options(&[self.stream.as_str()], &[">"], &opts)
            .await?;

        let mut messages = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                messages.push(RawMessage {
                    payload: entry.get("payload"),
                    id: entry.id,
                });
            }
        }
        Ok(messages)
    }

    /// 메시지 ACK.
    pub async fn ack(&self, id: &str) -> Result<(), FabricError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(&self.stream, &self.group, &[id]).await?;
        Ok(())
    }

    /// payload 파싱.
    pub fn parse(&self, raw: &RawMessage) -> Result<T, serde_json::Error> {
        let payload = raw.payload.as_deref().unwrap_or("");
        serde_json::from_str(payload)
    }

    /// 손상 메시지 처리: ACK 후 dead-letter 기록.
    pub async fn dead_letter(&self, raw: &RawMessage, reason: &str) -> Result<(), FabricError> {
        self.ack(&raw.id).await?;
        let payload = raw.payload.as_deref().unwrap_or("");
        let truncated: String = payload.chars().take(2_000).collect();
        let mut conn = self.conn.clone();
        let _: String = conn
            .xadd_maxlen(
                STREAM_DEAD_LETTER,
                StreamMaxlen::Approx(10_000),
                "*",
                &[
                    ("source", self.stream.as_str()),
                    ("msg_id", raw.id.as_str()),
                    ("reason", reason),
                    ("payload", truncated.as_str()),
                ],
            )
            .await?;
        warn!(
            stream = %self.stream,
            msg_id = %raw.id,
            reason = %reason,
            "dead-letter 기록"
        );
        Ok(())
    }

    /// ACK 우선(at-most-once) 소비: 디코드 즉시 ACK 후 레코드 반환.
    ///
    /// 손상 payload는 dead-letter로 보내고 배치에서 제외합니다.
    /// 틱 소비자(Scanner/Monitor) 전용 경로.
    pub async fn next_records_ack_first(&self) -> Result<Vec<T>, FabricError> {
        let raw_batch = self.fetch().await?;
        let mut records = Vec::with_capacity(raw_batch.len());
        for raw in raw_batch {
            self.ack(&raw.id).await?;
            match self.parse(&raw) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // 이미 ACK됨 — dead-letter 기록만 남김
                    if let Err(dl_err) = self.log_dead_letter_only(&raw, &e.to_string()).await {
                        error!(error = %dl_err, "dead-letter 기록 실패");
                    }
                }
            }
        }
        Ok(records)
    }

    async fn log_dead_letter_only(
        &self,
        raw: &RawMessage,
        reason: &str,
    ) -> Result<(), FabricError> {
        let payload = raw.payload.as_deref().unwrap_or("");
        let truncated: String = payload.chars().take(2_000).collect();
        let mut conn = self.conn.clone();
        let _: String = conn
            .xadd_maxlen(
                STREAM_DEAD_LETTER,
                StreamMaxlen::Approx(10_000),
                "*",
                &[
                    ("source", self.stream.as_str()),
                    ("msg_id", raw.id.as_str()),
                    ("reason", reason),
                    ("payload", truncated.as_str()),
                ],
            )
            .await?;
        Ok(())
    }

    /// 유휴 pending 메시지 회수.
    ///
    /// 원 소비자가 300초 이상 잡고 있는 메시지를 이 소비자로 XCLAIM하여
    /// 반환합니다. 호출자는 일반 메시지와 동일하게 처리 후 ACK합니다.
    pub async fn reclaim_stale(&self) -> Result<Vec<RawMessage>, FabricError> {
        let mut conn = self.conn.clone();
        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.stream, &self.group, "-", "+", 100)
            .await?;

        let stale_ids: Vec<String> = pending
            .ids
            .iter()
            .filter(|p| p.last_delivered_ms >= PENDING_MIN_IDLE_MS as usize)
            .map(|p| p.id.clone())
            .collect();

        if stale_ids.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            stream = %self.stream,
            count = stale_ids.len(),
            "유휴 pending 메시지 회수"
        );

        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.stream,
                &self.group,
                &self.consumer,
                PENDING_MIN_IDLE_MS as usize,
                &stale_ids,
            )
            .await?;

        Ok(claimed
            .ids
            .into_iter()
            .map(|entry| RawMessage {
                payload: entry.get("payload"),
                id: entry.id,
            })
            .collect())
    }
}

/// Consumer group 생성 (이미 존재하면 무시).
async fn ensure_group(
    conn: &ConnectionManager,
    stream: &str,
    group: &str,
) -> Result<(), FabricError> {
    for attempt in 0..STARTUP_RETRY_SECS {
        let mut conn = conn.clone();
        let result: Result<String, redis::RedisError> =
            conn.xgroup_create_mkstream(stream, group, "0").await;
        match result {
            Ok(_) => return Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => return Ok(()),
            Err(e) if e.kind() == redis::ErrorKind::BusyLoadingError || e.is_io_error() => {
                warn!(
                    stream = %stream,
                    group = %group,
                    attempt = attempt + 1,
                    max = STARTUP_RETRY_SECS,
                    "Redis 준비 대기 중"
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(FabricError::NotReady(format!(
        "{}초 내 consumer group 생성 실패: {}/{}",
        STARTUP_RETRY_SECS, stream, group
    )))
}
