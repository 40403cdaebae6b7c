//! Price Monitor.
//!
//! 보유 포지션별로 틱마다 12규칙 exit chain을 평가해 SellOrder를
//! 발행합니다. 30초마다 증권사 잔고와 로컬 메타데이터를 대사합니다.

pub mod exit;
pub mod monitor;

pub use exit::{evaluate_exit, ExitDecision, PositionContext};
pub use monitor::PriceMonitor;
