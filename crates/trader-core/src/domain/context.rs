//! 매크로 트레이딩 컨텍스트.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{MarketRegime, SectorGroup, VixRegime};

/// Macro Council이 발행하는 트레이딩 컨텍스트.
///
/// 캐시 키 `macro:trading_context`, TTL 1시간. 코어는 읽기 전용으로
/// 소비하며, 캐시에 없으면 [`TradingContext::fallback`]을 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingContext {
    pub date: NaiveDate,
    pub market_regime: MarketRegime,
    /// 포지션 배율 [0.3, 2.0]
    #[serde(default = "default_multiplier")]
    pub position_multiplier: f64,
    /// 손절 배율 [0.3, 2.0]
    #[serde(default = "default_multiplier")]
    pub stop_loss_multiplier: f64,
    #[serde(default = "default_vix")]
    pub vix_regime: VixRegime,
    /// 0(정상)~10(전면 리스크오프)
    #[serde(default)]
    pub risk_off_level: u8,
    #[serde(default)]
    pub favor_sectors: Vec<SectorGroup>,
    #[serde(default)]
    pub avoid_sectors: Vec<SectorGroup>,
    #[serde(default)]
    pub is_high_volatility: bool,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_vix() -> VixRegime {
    VixRegime::Normal
}

impl TradingContext {
    /// 매크로 데이터 부재 시 안전 기본값: 보수적 배율의 SIDEWAYS.
    pub fn fallback(today: NaiveDate) -> Self {
        Self {
            date: today,
            market_regime: MarketRegime::Sideways,
            position_multiplier: 0.8,
            stop_loss_multiplier: 1.2,
            vix_regime: VixRegime::Normal,
            risk_off_level: 0,
            favor_sectors: Vec::new(),
            avoid_sectors: Vec::new(),
            is_high_volatility: false,
        }
    }

    /// 배율을 허용 범위 [0.3, 2.0]으로 클램프.
    pub fn clamped_position_multiplier(&self) -> f64 {
        self.position_multiplier.clamp(0.3, 2.0)
    }

    /// 손절 배율 클램프.
    pub fn clamped_stop_loss_multiplier(&self) -> f64 {
        self.stop_loss_multiplier.clamp(0.3, 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_conservative_sideways() {
        let ctx = TradingContext::fallback(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        assert_eq!(ctx.market_regime, MarketRegime::Sideways);
        assert_eq!(ctx.position_multiplier, 0.8);
        assert_eq!(ctx.stop_loss_multiplier, 1.2);
    }

    #[test]
    fn multiplier_clamped_to_valid_range() {
        let mut ctx = TradingContext::fallback(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        ctx.position_multiplier = 5.0;
        assert_eq!(ctx.clamped_position_multiplier(), 2.0);
        ctx.position_multiplier = 0.1;
        assert_eq!(ctx.clamped_position_multiplier(), 0.3);
    }

    #[test]
    fn unknown_fields_ignored() {
        let json = r#"{
            "date": "2025-07-01",
            "market_regime": "BULL",
            "position_multiplier": 1.2,
            "stop_loss_multiplier": 0.9,
            "vix_regime": "low",
            "risk_off_level": 1,
            "favor_sectors": [],
            "avoid_sectors": [],
            "is_high_volatility": false,
            "council_cost_usd": 0.42
        }"#;
        let ctx: TradingContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.market_regime, MarketRegime::Bull);
    }
}
