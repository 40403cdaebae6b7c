//! 열거형 정의 — 시스템 전체에서 사용하는 상수값.

use serde::{Deserialize, Serialize};

/// 시장 국면. Macro Council이 산출하며 코어는 읽기 전용으로 소비.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    StrongBull,
    Bull,
    Sideways,
    Bear,
    StrongBear,
}

impl MarketRegime {
    /// 상승 국면 여부 (BULL, STRONG_BULL).
    pub fn is_bull(self) -> bool {
        matches!(self, Self::Bull | Self::StrongBull)
    }

    /// 하락 국면 여부 (BEAR, STRONG_BEAR).
    pub fn is_bear(self) -> bool {
        matches!(self, Self::Bear | Self::StrongBear)
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongBull => "STRONG_BULL",
            Self::Bull => "BULL",
            Self::Sideways => "SIDEWAYS",
            Self::Bear => "BEAR",
            Self::StrongBear => "STRONG_BEAR",
        };
        f.write_str(s)
    }
}

/// 거래 등급. BLOCKED는 Scout Veto — 어떤 경로로도 매수 불가.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeTier {
    Tier1,
    Tier2,
    Blocked,
}

impl std::fmt::Display for TradeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Tier1 => "TIER1",
            Self::Tier2 => "TIER2",
            Self::Blocked => "BLOCKED",
        };
        f.write_str(s)
    }
}

/// 리스크 태그.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTag {
    Bullish,
    Neutral,
    Caution,
    DistributionRisk,
}

/// 매수 시그널 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    GoldenCross,
    RsiRebound,
    Momentum,
    MomentumContinuation,
    DipBuy,
    VolumeBreakout,
    WatchlistConviction,
    OrbBreakout,
}

impl SignalType {
    /// 모멘텀 계열 여부 — 지정가 주문 대상.
    pub fn is_momentum_family(self) -> bool {
        matches!(self, Self::Momentum | Self::MomentumContinuation)
    }

    /// RSI 가드를 우회하는 전략 여부 (부분 게이트 우회).
    pub fn bypasses_rsi_guard(self) -> bool {
        matches!(
            self,
            Self::MomentumContinuation | Self::WatchlistConviction | Self::OrbBreakout
        )
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::GoldenCross => "GOLDEN_CROSS",
            Self::RsiRebound => "RSI_REBOUND",
            Self::Momentum => "MOMENTUM",
            Self::MomentumContinuation => "MOMENTUM_CONTINUATION",
            Self::DipBuy => "DIP_BUY",
            Self::VolumeBreakout => "VOLUME_BREAKOUT",
            Self::WatchlistConviction => "WATCHLIST_CONVICTION",
            Self::OrbBreakout => "ORB_BREAKOUT",
        };
        f.write_str(s)
    }
}

/// 매도 사유. 모니터의 exit chain 규칙과 1:1 대응.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SellReason {
    ProfitTarget,
    ProfitFloor,
    ProfitLock,
    BreakevenStop,
    StopLoss,
    AtrStop,
    TrailingStop,
    ScaleOut,
    RsiOverbought,
    DeathCross,
    TimeExit,
    Manual,
}

impl SellReason {
    /// 손절성 매도 여부 — 3일 재매수 쿨다운 대상.
    pub fn is_stoploss_kind(self) -> bool {
        matches!(
            self,
            Self::StopLoss | Self::AtrStop | Self::DeathCross | Self::BreakevenStop
        )
    }
}

impl std::fmt::Display for SellReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProfitTarget => "PROFIT_TARGET",
            Self::ProfitFloor => "PROFIT_FLOOR",
            Self::ProfitLock => "PROFIT_LOCK",
            Self::BreakevenStop => "BREAKEVEN_STOP",
            Self::StopLoss => "STOP_LOSS",
            Self::AtrStop => "ATR_STOP",
            Self::TrailingStop => "TRAILING_STOP",
            Self::ScaleOut => "SCALE_OUT",
            Self::RsiOverbought => "RSI_OVERBOUGHT",
            Self::DeathCross => "DEATH_CROSS",
            Self::TimeExit => "TIME_EXIT",
            Self::Manual => "MANUAL",
        };
        f.write_str(s)
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// 시장가
    Market,
    /// 지정가 (price 필수)
    Limit,
}

/// VIX 변동성 국면.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VixRegime {
    Low,
    Normal,
    Elevated,
    Crisis,
}

/// 거래 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeType {
    Buy,
    Sell,
}

/// 15개 섹터 대분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectorGroup {
    #[serde(rename = "반도체/IT")]
    SemiconductorIt,
    #[serde(rename = "바이오/헬스케어")]
    BioHealth,
    #[serde(rename = "2차전지/소재")]
    SecondaryBattery,
    #[serde(rename = "금융")]
    Finance,
    #[serde(rename = "자동차")]
    Automobile,
    #[serde(rename = "건설/부동산")]
    Construction,
    #[serde(rename = "화학/에너지")]
    Chemical,
    #[serde(rename = "철강/소재")]
    SteelMaterial,
    #[serde(rename = "음식료/생활")]
    FoodConsumer,
    #[serde(rename = "미디어/엔터")]
    MediaEntertainment,
    #[serde(rename = "운송/물류")]
    LogisticsTransport,
    #[serde(rename = "통신")]
    Telecom,
    #[serde(rename = "유틸리티")]
    Utility,
    #[serde(rename = "조선/방산")]
    DefenseShipbuilding,
    #[serde(rename = "기타")]
    Etc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_serde_roundtrip() {
        let json = serde_json::to_string(&MarketRegime::StrongBull).unwrap();
        assert_eq!(json, "\"STRONG_BULL\"");
        let back: MarketRegime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MarketRegime::StrongBull);
    }

    #[test]
    fn sell_reason_stoploss_kinds() {
        assert!(SellReason::StopLoss.is_stoploss_kind());
        assert!(SellReason::AtrStop.is_stoploss_kind());
        assert!(SellReason::DeathCross.is_stoploss_kind());
        assert!(SellReason::BreakevenStop.is_stoploss_kind());
        assert!(!SellReason::TrailingStop.is_stoploss_kind());
        assert!(!SellReason::Manual.is_stoploss_kind());
    }

    #[test]
    fn momentum_family_and_rsi_bypass() {
        assert!(SignalType::Momentum.is_momentum_family());
        assert!(SignalType::MomentumContinuation.is_momentum_family());
        assert!(!SignalType::GoldenCross.is_momentum_family());

        assert!(SignalType::MomentumContinuation.bypasses_rsi_guard());
        assert!(SignalType::OrbBreakout.bypasses_rsi_guard());
        assert!(!SignalType::Momentum.bypasses_rsi_guard());
    }

    #[test]
    fn sector_group_korean_rename() {
        let json = serde_json::to_string(&SectorGroup::SemiconductorIt).unwrap();
        assert_eq!(json, "\"반도체/IT\"");
    }
}
