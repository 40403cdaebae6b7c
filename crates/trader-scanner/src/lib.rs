//! Buy Scanner.
//!
//! 워치리스트 종목의 실시간 틱을 소비해 1분봉을 집계하고, 전략 감지와
//! 리스크 게이트를 거쳐 BuySignal을 `stream:buy-signals`에 발행합니다.
//!
//! # 동시성
//!
//! 리더 태스크 하나가 최대 100건 배치를 읽어 코드 해시로 워커(기본 4)에
//! 분배합니다. 같은 코드는 항상 같은 워커에 붙으므로 코드별 순서가
//! 보장되고, 봉 링/쿨다운 맵은 워커 로컬이라 락이 필요 없습니다.

pub mod bars;
pub mod gates;
pub mod scanner;
pub mod strategies;

pub use bars::BarEngine;
pub use scanner::{ScannerShared, ScannerWorker};
