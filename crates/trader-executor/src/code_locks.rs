//! 프로세스 내 코드별 뮤텍스 맵.
//!
//! 같은 종목의 동시 시그널을 프로세스 안에서 직렬화합니다.
//! 프로세스 간 중복은 분산 락(`lock:buy:{code}`)이 막습니다.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use trader_core::StockCode;

#[derive(Default)]
pub struct CodeLocks {
    inner: Mutex<HashMap<StockCode, Arc<Mutex<()>>>>,
}

impl CodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 코드 뮤텍스 획득 — 해제는 가드 드롭.
    pub async fn acquire(&self, code: &StockCode) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(code.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn same_code_is_serialized() {
        let locks = Arc::new(CodeLocks::new());
        let counter = Arc::new(AtomicU32::new(0));
        let code = StockCode::new("005930").unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&code).await;
                // 임계 구역: 동시 진입이면 0이 아닌 값을 관측
                let inside = counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(inside, 0);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_codes_run_concurrently() {
        let locks = Arc::new(CodeLocks::new());
        let a = locks.acquire(&StockCode::new("005930").unwrap()).await;
        // 다른 코드는 블로킹 없이 획득
        let b = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.acquire(&StockCode::new("000660").unwrap()),
        )
        .await;
        assert!(b.is_ok());
        drop(a);
    }
}
