//! 운영자 알림 크레이트.
//!
//! 알림은 베스트 에포트(fire-and-forget)입니다 — 전송 실패가 트레이딩
//! 경로를 막아서는 안 됩니다.

pub mod telegram;

pub use telegram::{notify, AlertLevel, TelegramSender};
