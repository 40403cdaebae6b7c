//! 트레이딩 코어 공용 크레이트.
//!
//! 서비스 경계를 넘는 모든 레코드 타입과 순수 계산(지표, 호가 단위,
//! 세션 판정), 환경변수 기반 설정 스냅샷을 제공합니다.
//!
//! # 구조
//!
//! ```text
//! domain/       // 검증된 불변 레코드 (BuySignal, SellOrder, Position, ...)
//! indicators    // SMA / RSI / ATR / Pearson — 순수 f64 계산
//! config        // 기동 시 1회 읽는 설정 스냅샷 (핫 리로드 없음)
//! krx           // 호가 단위 정렬, 장 세션 판정
//! time          // KST 시계
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod krx;
pub mod time;

pub use config::AppConfig;
pub use domain::context::TradingContext;
pub use domain::enums::{
    MarketRegime, OrderType, RiskTag, SectorGroup, SellReason, SignalType, TradeTier, TradeType,
    VixRegime,
};
pub use domain::portfolio::{PortfolioState, Position, PositionMeta};
pub use domain::stock::{
    DailyPrice, MinuteBar, MinutePrice, PriceTick, StockCode, StockSnapshot,
};
pub use domain::trading::{
    BuySignal, OrderRequest, OrderResult, OrderStatus, SellOrder, TradeRecord,
};
pub use domain::watchlist::{HotWatchlist, WatchlistEntry};
pub use error::DomainError;
