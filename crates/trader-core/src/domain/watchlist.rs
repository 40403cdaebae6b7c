//! 워치리스트 모델 — 외부 Scout가 발행, 코어는 읽기 전용.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{MarketRegime, RiskTag, SectorGroup, TradeTier};
use super::stock::StockCode;
use crate::error::DomainError;

/// Hot Watchlist 개별 종목.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub stock_code: StockCode,
    pub stock_name: String,
    /// 정량+LLM 하이브리드 점수 [0, 100]
    pub hybrid_score: f64,
    /// LLM 단독 점수 [0, 100]
    pub llm_score: f64,
    pub is_tradable: bool,
    pub trade_tier: TradeTier,
    #[serde(default = "default_risk_tag")]
    pub risk_tag: RiskTag,
    pub rank: u32,
    #[serde(default)]
    pub sector_group: Option<SectorGroup>,
    #[serde(default)]
    pub veto_applied: bool,
    #[serde(default)]
    pub scored_at: Option<DateTime<Utc>>,
}

fn default_risk_tag() -> RiskTag {
    RiskTag::Neutral
}

impl WatchlistEntry {
    /// 경계 불변식 검증.
    ///
    /// - `trade_tier == BLOCKED ⇒ is_tradable == false`
    /// - `risk_tag == DISTRIBUTION_RISK ⇒ veto_applied ∧ !is_tradable`
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.trade_tier == TradeTier::Blocked && self.is_tradable {
            return Err(DomainError::InvariantViolation(format!(
                "{}: BLOCKED 티어인데 is_tradable=true",
                self.stock_code
            )));
        }
        if self.risk_tag == RiskTag::DistributionRisk && (!self.veto_applied || self.is_tradable) {
            return Err(DomainError::InvariantViolation(format!(
                "{}: DISTRIBUTION_RISK인데 veto 미적용",
                self.stock_code
            )));
        }
        Ok(())
    }
}

/// Hot Watchlist 전체 — 캐시 `watchlist:active`의 단일 교체 단위.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotWatchlist {
    pub generated_at: DateTime<Utc>,
    pub market_regime: MarketRegime,
    pub stocks: Vec<WatchlistEntry>,
    pub version: String,
}

impl HotWatchlist {
    pub fn stock_codes(&self) -> Vec<StockCode> {
        self.stocks.iter().map(|s| s.stock_code.clone()).collect()
    }

    pub fn get_stock(&self, code: &StockCode) -> Option<&WatchlistEntry> {
        self.stocks.iter().find(|s| &s.stock_code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tier: TradeTier, tradable: bool, tag: RiskTag, veto: bool) -> WatchlistEntry {
        WatchlistEntry {
            stock_code: StockCode::new("005930").unwrap(),
            stock_name: "삼성전자".to_string(),
            hybrid_score: 78.0,
            llm_score: 72.0,
            is_tradable: tradable,
            trade_tier: tier,
            risk_tag: tag,
            rank: 1,
            sector_group: Some(SectorGroup::SemiconductorIt),
            veto_applied: veto,
            scored_at: None,
        }
    }

    #[test]
    fn blocked_must_not_be_tradable() {
        assert!(entry(TradeTier::Blocked, true, RiskTag::Neutral, false)
            .validate()
            .is_err());
        assert!(entry(TradeTier::Blocked, false, RiskTag::Neutral, false)
            .validate()
            .is_ok());
    }

    #[test]
    fn distribution_risk_requires_veto() {
        assert!(
            entry(TradeTier::Tier1, true, RiskTag::DistributionRisk, false)
                .validate()
                .is_err()
        );
        assert!(
            entry(TradeTier::Blocked, false, RiskTag::DistributionRisk, true)
                .validate()
                .is_ok()
        );
    }
}
