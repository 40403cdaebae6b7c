//! KIS OpenAPI 커넥터.
//!
//! Reference: https://apiportal.koreainvestment.com/

pub mod auth;
pub mod client;

pub use auth::KisAuth;
pub use client::KisClient;

/// 거래 TR ID. 모의투자는 V 접두 변형 사용.
pub mod tr_id {
    pub const PRICE: &str = "FHKST01010100";
    pub const DAILY_PRICE: &str = "FHKST01010400";
    pub const MINUTE_CHART: &str = "FHKST03010200";
    pub const ORDER_BUY: &str = "TTTC0802U";
    pub const ORDER_SELL: &str = "TTTC0801U";
    pub const ORDER_CANCEL: &str = "TTTC0803U";
    pub const ORDER_HISTORY: &str = "TTTC8001R";
    pub const BALANCE: &str = "TTTC8434R";
    pub const BUYING_POWER: &str = "TTTC8908R";
    pub const HOLIDAY: &str = "CTCA0903R";
    /// 실시간 체결가 (WebSocket)
    pub const WS_TRADE: &str = "H0STCNT0";

    /// 모의투자 TR ID 변환 — 주문/계좌 계열만 V 접두.
    pub fn paper(tr: &str) -> String {
        if tr.starts_with("TTTC") {
            format!("V{}", &tr[1..])
        } else {
            tr.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tr_id;

    #[test]
    fn paper_variant_only_for_trading_tr() {
        assert_eq!(tr_id::paper(tr_id::ORDER_BUY), "VTTC0802U");
        assert_eq!(tr_id::paper(tr_id::BALANCE), "VTTC8434R");
        assert_eq!(tr_id::paper(tr_id::PRICE), "FHKST01010100");
        assert_eq!(tr_id::paper(tr_id::HOLIDAY), "CTCA0903R");
    }
}
