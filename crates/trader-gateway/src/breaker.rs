//! 엔드포인트별 서킷 브레이커.
//!
//! CLOSED → OPEN: 30초 윈도우 내 연속 실패 5회.
//! OPEN: 60초간 즉시 거부 (CIRCUIT_OPEN).
//! HALF_OPEN: 프로브 1건만 통과. 성공 → CLOSED, 실패 → OPEN.
//!
//! 상태는 프로세스 로컬이며 공유되지 않습니다.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct EndpointState {
    state: State,
    consecutive_failures: u32,
    /// 연속 실패 카운트가 시작된 시각 (30초 윈도우)
    window_start: Instant,
    opened_at: Instant,
    /// HALF_OPEN에서 프로브가 나가 있는지
    probe_in_flight: bool,
}

impl EndpointState {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            window_start: now,
            opened_at: now,
            probe_in_flight: false,
        }
    }
}

/// 엔드포인트 이름 → 브레이커 상태 맵.
pub struct CircuitBreaker {
    endpoints: Mutex<HashMap<String, EndpointState>>,
    failure_threshold: u32,
    window: Duration,
    open_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, window: Duration, open_duration: Duration) -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            failure_threshold,
            window,
            open_duration,
        }
    }

    /// 호출 전 통과 여부 확인.
    ///
    /// OPEN이면 CIRCUIT_OPEN 거부. OPEN 시간이 지나면 HALF_OPEN으로
    /// 전이하며 프로브 1건만 admit합니다.
    pub async fn check(&self, endpoint: &str) -> Result<(), GatewayError> {
        let mut endpoints = self.endpoints.lock().await;
        let entry = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(EndpointState::new);

        match entry.state {
            State::Closed => Ok(()),
            State::Open => {
                if entry.opened_at.elapsed() >= self.open_duration {
                    entry.state = State::HalfOpen;
                    entry.probe_in_flight = true;
                    warn!(endpoint = %endpoint, "브레이커 HALF_OPEN — 프로브 1건 허용");
                    Ok(())
                } else {
                    Err(GatewayError::CircuitOpen {
                        endpoint: endpoint.to_string(),
                    })
                }
            }
            State::HalfOpen => {
                if entry.probe_in_flight {
                    Err(GatewayError::CircuitOpen {
                        endpoint: endpoint.to_string(),
                    })
                } else {
                    entry.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// 성공 기록 — HALF_OPEN 프로브 성공 시 CLOSED 복귀.
    pub async fn record_success(&self, endpoint: &str) {
        let mut endpoints = self.endpoints.lock().await;
        let entry = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(EndpointState::new);

        if entry.state == State::HalfOpen {
            warn!(endpoint = %endpoint, "브레이커 CLOSED 복귀");
        }
        entry.state = State::Closed;
        entry.consecutive_failures = 0;
        entry.probe_in_flight = false;
    }

    /// 전송 실패 기록.
    pub async fn record_failure(&self, endpoint: &str) {
        let mut endpoints = self.endpoints.lock().await;
        let entry = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(EndpointState::new);

        match entry.state {
            State::HalfOpen => {
                // 프로브 실패 → 다시 OPEN
                entry.state = State::Open;
                entry.opened_at = Instant::now();
                entry.probe_in_flight = false;
                warn!(endpoint = %endpoint, "브레이커 프로브 실패 — OPEN 재진입");
            }
            State::Open => {}
            State::Closed => {
                // 윈도우 밖이면 카운트 리셋
                if entry.window_start.elapsed() > self.window {
                    entry.consecutive_failures = 0;
                    entry.window_start = Instant::now();
                }
                entry.consecutive_failures += 1;

                if entry.consecutive_failures >= self.failure_threshold {
                    entry.state = State::Open;
                    entry.opened_at = Instant::now();
                    warn!(
                        endpoint = %endpoint,
                        failures = entry.consecutive_failures,
                        "브레이커 OPEN"
                    );
                }
            }
        }
    }

    /// min_age 이상 OPEN 상태인 엔드포인트 목록 (운영자 알림용).
    pub async fn long_open_endpoints(&self, min_age: Duration) -> Vec<String> {
        let endpoints = self.endpoints.lock().await;
        endpoints
            .iter()
            .filter(|(_, s)| s.state == State::Open && s.opened_at.elapsed() >= min_age)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_secs(30), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn opens_after_five_consecutive_failures() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure("snapshot").await;
        }
        assert!(cb.check("snapshot").await.is_ok());

        cb.record_failure("snapshot").await;
        assert!(matches!(
            cb.check("snapshot").await,
            Err(GatewayError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure("order").await;
        }
        cb.record_success("order").await;
        for _ in 0..4 {
            cb.record_failure("order").await;
        }
        assert!(cb.check("order").await.is_ok());
    }

    #[tokio::test]
    async fn half_open_admits_single_probe() {
        tokio::time::pause();
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure("balance").await;
        }
        assert!(cb.check("balance").await.is_err());

        tokio::time::advance(Duration::from_secs(61)).await;

        // 첫 호출은 프로브로 허용, 두 번째는 거부
        assert!(cb.check("balance").await.is_ok());
        assert!(cb.check("balance").await.is_err());

        // 프로브 성공 → CLOSED
        cb.record_success("balance").await;
        assert!(cb.check("balance").await.is_ok());
    }

    #[tokio::test]
    async fn probe_failure_reopens() {
        tokio::time::pause();
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure("daily").await;
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cb.check("daily").await.is_ok());

        cb.record_failure("daily").await;
        assert!(cb.check("daily").await.is_err());
    }

    #[tokio::test]
    async fn breakers_are_per_endpoint() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure("snapshot").await;
        }
        assert!(cb.check("snapshot").await.is_err());
        assert!(cb.check("order").await.is_ok());
    }
}
