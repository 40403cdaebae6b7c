//! 공유 리스크 패브릭.
//!
//! 여섯 개 코어 프로세스를 잇는 유일한 조정 계층입니다. 프로세스 간
//! 공유 메모리는 없으며, 모든 조정은 메시지 버스(Redis Streams)와
//! 타입 캐시(JSON + TTL)를 통합니다.
//!
//! ```text
//! bus         // 타입 스트림 발행/소비 (consumer group, at-most-once)
//! cache       // JSON 직렬화 캐시 (watchlist, context, positions:live)
//! locks       // SETNX+TTL 분산 락, 쿨다운, 일일 카운터, 비상 정지
//! position    // 포지션 로컬 메타데이터 저장소
//! guard       // 포트폴리오 가드 (순수 함수)
//! correlation // 상관계수 캐시 (12h TTL)
//! keys        // 키/스트림 네이밍 단일 출처
//! ```

pub mod bus;
pub mod cache;
pub mod correlation;
pub mod error;
pub mod guard;
pub mod keys;
pub mod locks;
pub mod position;

pub use bus::{RawMessage, TypedStreamConsumer, TypedStreamPublisher};
pub use cache::TypedCache;
pub use correlation::CorrelationCache;
pub use error::FabricError;
pub use guard::{check_portfolio, GuardVerdict};
pub use locks::{Cooldowns, DailyBuyCounter, DistributedLock, TradeMarkers};
pub use position::PositionStore;

/// Redis 연결 매니저 생성.
pub async fn connect(redis_url: &str) -> Result<redis::aio::ConnectionManager, FabricError> {
    let client = redis::Client::open(redis_url)?;
    let conn = client.get_connection_manager().await?;
    Ok(conn)
}
