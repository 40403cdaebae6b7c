//! 프로세스 전역 토큰 버킷.
//!
//! KIS 계정 한도(20/s)를 보호하기 위해 모든 아웃바운드 REST 호출이
//! 초당 19개 토큰 하나의 버킷을 공유합니다. IP가 아닌 계정 단위 한도
//! 이므로 프로세스 전역 단일 구조입니다.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// 토큰 버킷. 필요 시점에 경과 시간만큼 충전하는 lazy-refill 형태.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: u32) -> Self {
        let capacity = rate_per_sec as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec: capacity,
        }
    }

    /// 토큰 1개 획득. 기한 내 확보하지 못하면 false (RATE_LIMITED).
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return true;
                }
            }

            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_within_capacity_succeeds() {
        let bucket = TokenBucket::new(19);
        for _ in 0..19 {
            assert!(bucket.acquire(Duration::from_millis(10)).await);
        }
    }

    #[tokio::test]
    async fn twentieth_call_in_burst_is_limited() {
        let bucket = TokenBucket::new(19);
        let mut granted = 0;
        for _ in 0..20 {
            if bucket.acquire(Duration::from_millis(5)).await {
                granted += 1;
            }
        }
        // 1초 윈도우 내 아웃바운드는 19 이하
        assert!(granted <= 19);
        assert!(granted >= 19); // 버킷이 가득 찬 상태에서 시작하므로 정확히 19
    }

    #[tokio::test]
    async fn refills_over_time() {
        tokio::time::pause();
        let bucket = TokenBucket::new(19);
        for _ in 0..19 {
            assert!(bucket.acquire(Duration::from_millis(1)).await);
        }
        assert!(!bucket.acquire(Duration::from_millis(1)).await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.acquire(Duration::from_millis(1)).await);
    }
}
