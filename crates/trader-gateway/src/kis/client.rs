//! KIS REST 클라이언트.
//!
//! 토큰 헤더 구성, 공통 요청, 응답 파싱. KIS는 업무 오류도 HTTP 200에
//! `rt_cd != "0"`으로 싣기 때문에 상태 코드와 rt_cd를 모두 봅니다.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, warn};

use trader_core::{
    DailyPrice, MinutePrice, OrderRequest, OrderResult, OrderStatus, OrderType, PortfolioState,
    Position, StockCode, StockSnapshot, TradeType,
};

use super::auth::KisAuth;
use super::tr_id;
use crate::error::GatewayError;

pub struct KisClient {
    auth: Arc<KisAuth>,
    http: reqwest::Client,
}

impl KisClient {
    pub fn new(auth: Arc<KisAuth>, http: reqwest::Client) -> Self {
        Self { auth, http }
    }

    fn effective_tr(&self, tr: &str) -> String {
        if self.auth.config().is_paper {
            tr_id::paper(tr)
        } else {
            tr.to_string()
        }
    }

    /// 공통 요청. 5xx/전송 실패 → UPSTREAM_ERROR, rt_cd != "0" → 업무 오류.
    async fn request(
        &self,
        method: Method,
        path: &str,
        tr: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, GatewayError> {
        let token = self.auth.bearer_token().await?;
        let config = self.auth.config();
        let url = format!("{}{}", config.base_url, path);

        let mut req = self
            .http
            .request(method, &url)
            .header("Content-Type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {}", token))
            .header("appkey", &config.app_key)
            .header("appsecret", &config.app_secret)
            .header("tr_id", self.effective_tr(tr))
            .header("custtype", "P");

        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(GatewayError::Upstream(format!("KIS HTTP {}", status)));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("KIS 응답 파싱 실패: {}", e)))?;

        let rt_cd = data.get("rt_cd").and_then(|v| v.as_str()).unwrap_or("");
        if rt_cd != "0" {
            let msg_cd = data
                .get("msg_cd")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let msg = data
                .get("msg1")
                .and_then(|v| v.as_str())
                .unwrap_or("알 수 없는 KIS 오류")
                .trim()
                .to_string();
            return Err(GatewayError::Business {
                code: msg_cd,
                message: msg,
            });
        }

        Ok(data)
    }

    // ==================== 시세 ====================

    /// 현재가 스냅샷 (FHKST01010100).
    pub async fn get_snapshot(&self, code: &StockCode) -> Result<StockSnapshot, GatewayError> {
        let data = self
            .request(
                Method::GET,
                "/uapi/domestic-stock/v1/quotations/inquire-price",
                tr_id::PRICE,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                    ("FID_INPUT_ISCD", code.to_string()),
                ],
                None,
            )
            .await?;
        let output = &data["output"];

        Ok(StockSnapshot {
            stock_code: code.clone(),
            price: field_dec(output, "stck_prpr"),
            open_price: field_dec(output, "stck_oprc"),
            high_price: field_dec(output, "stck_hgpr"),
            low_price: field_dec(output, "stck_lwpr"),
            volume: field_i64(output, "acml_vol"),
            change_pct: field_f64(output, "prdy_ctrt").unwrap_or(0.0),
            per: field_f64(output, "per"),
            pbr: field_f64(output, "pbr"),
            timestamp: Utc::now(),
        })
    }

    /// 일봉 조회 (FHKST01010400). 최신순으로 최대 days개.
    pub async fn get_daily_prices(
        &self,
        code: &StockCode,
        days: usize,
    ) -> Result<Vec<DailyPrice>, GatewayError> {
        let end_date = trader_core::time::kst_now().format("%Y%m%d").to_string();
        let data = self
            .request(
                Method::GET,
                "/uapi/domestic-stock/v1/quotations/inquire-daily-price",
                tr_id::DAILY_PRICE,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                    ("FID_INPUT_ISCD", code.to_string()),
                    ("FID_INPUT_DATE_1", String::new()),
                    ("FID_INPUT_DATE_2", end_date),
                    ("FID_PERIOD_DIV_CODE", "D".to_string()),
                    ("FID_ORG_ADJ_PRC", "0".to_string()),
                ],
                None,
            )
            .await?;

        let mut prices = Vec::new();
        if let Some(rows) = data["output"].as_array() {
            for row in rows.iter().take(days) {
                let Some(date_str) = row.get("stck_bsop_date").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Ok(price_date) = NaiveDate::parse_from_str(date_str, "%Y%m%d") else {
                    warn!(stock_code = %code, raw = %date_str, "일봉 날짜 파싱 실패, 건너뜀");
                    continue;
                };
                prices.push(DailyPrice {
                    stock_code: code.clone(),
                    price_date,
                    open_price: field_dec(row, "stck_oprc"),
                    high_price: field_dec(row, "stck_hgpr"),
                    low_price: field_dec(row, "stck_lwpr"),
                    close_price: field_dec(row, "stck_clpr"),
                    volume: field_i64(row, "acml_vol"),
                    change_pct: field_f64(row, "prdy_ctrt"),
                });
            }
        }
        Ok(prices)
    }

    /// 분봉 조회 (FHKST03010200).
    pub async fn get_minute_prices(
        &self,
        code: &StockCode,
        count: usize,
    ) -> Result<Vec<MinutePrice>, GatewayError> {
        let now = trader_core::time::kst_now();
        let data = self
            .request(
                Method::GET,
                "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice",
                tr_id::MINUTE_CHART,
                &[
                    ("FID_ETC_CLS_CODE", String::new()),
                    ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                    ("FID_INPUT_ISCD", code.to_string()),
                    ("FID_INPUT_HOUR_1", now.format("%H%M%S").to_string()),
                    ("FID_PW_DATA_INCU_YN", "N".to_string()),
                ],
                None,
            )
            .await?;

        let mut prices = Vec::new();
        if let Some(rows) = data["output2"].as_array() {
            for row in rows.iter().take(count) {
                let date_str = row
                    .get("stck_bsop_date")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let time_str = row
                    .get("stck_cntg_hour")
                    .and_then(|v| v.as_str())
                    .unwrap_or("000000");
                let Ok(price_datetime) = NaiveDateTime::parse_from_str(
                    &format!("{}{}", date_str, time_str),
                    "%Y%m%d%H%M%S",
                ) else {
                    continue;
                };
                prices.push(MinutePrice {
                    stock_code: code.clone(),
                    price_datetime,
                    open_price: field_dec(row, "stck_oprc"),
                    high_price: field_dec(row, "stck_hgpr"),
                    low_price: field_dec(row, "stck_lwpr"),
                    close_price: field_dec(row, "stck_prpr"),
                    volume: field_i64(row, "cntg_vol"),
                });
            }
        }
        Ok(prices)
    }

    // ==================== 주문 ====================

    /// 현금 주문 (매수 TTTC0802U / 매도 TTTC0801U).
    pub async fn place_order(
        &self,
        trade_type: TradeType,
        order: &OrderRequest,
    ) -> Result<OrderResult, GatewayError> {
        order.validate().map_err(|e| GatewayError::Validation(e.to_string()))?;

        let tr = match trade_type {
            TradeType::Buy => tr_id::ORDER_BUY,
            TradeType::Sell => tr_id::ORDER_SELL,
        };
        let config = self.auth.config();

        // 시장가 01 / 지정가 00
        let (ord_dvsn, unit_price) = match order.order_type {
            OrderType::Market => ("01", Decimal::ZERO),
            OrderType::Limit => ("00", order.price.unwrap_or(Decimal::ZERO)),
        };

        let data = self
            .request(
                Method::POST,
                "/uapi/domestic-stock/v1/trading/order-cash",
                tr,
                &[],
                Some(json!({
                    "CANO": config.account_no,
                    "ACNT_PRDT_CD": config.account_product_code,
                    "PDNO": order.stock_code.as_str(),
                    "ORD_DVSN": ord_dvsn,
                    "ORD_QTY": order.quantity.to_string(),
                    "ORD_UNPR": unit_price.trunc().to_string(),
                })),
            )
            .await?;

        let output = &data["output"];
        let order_no = output
            .get("ODNO")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        debug!(
            stock_code = %order.stock_code,
            order_no = %order_no,
            quantity = order.quantity,
            "주문 접수"
        );

        Ok(OrderResult {
            success: true,
            order_no: (!order_no.is_empty()).then_some(order_no),
            stock_code: order.stock_code.clone(),
            quantity: order.quantity,
            filled_quantity: 0,
            avg_fill_price: None,
            message: None,
        })
    }

    /// 주문 취소 (TTTC0803U). 업무 오류(이미 체결 등)는 false.
    pub async fn cancel_order(&self, order_no: &str) -> Result<bool, GatewayError> {
        let config = self.auth.config();
        let result = self
            .request(
                Method::POST,
                "/uapi/domestic-stock/v1/trading/order-rvsecncl",
                tr_id::ORDER_CANCEL,
                &[],
                Some(json!({
                    "CANO": config.account_no,
                    "ACNT_PRDT_CD": config.account_product_code,
                    "KRX_FWDG_ORD_ORGNO": "",
                    "ORGN_ODNO": order_no,
                    "ORD_DVSN": "00",
                    "RVSE_CNCL_DVSN_CD": "02",
                    "ORD_QTY": "0",
                    "ORD_UNPR": "0",
                    "QTY_ALL_ORD_YN": "Y",
                })),
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(GatewayError::Business { code, message }) => {
                debug!(order_no = %order_no, code = %code, message = %message, "취소 거부");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// 주문 체결 상태 (TTTC8001R 당일 주문 조회에서 추출).
    pub async fn order_status(&self, order_no: &str) -> Result<OrderStatus, GatewayError> {
        let today = trader_core::time::kst_now().format("%Y%m%d").to_string();
        let config = self.auth.config();
        let data = self
            .request(
                Method::GET,
                "/uapi/domestic-stock/v1/trading/inquire-daily-ccld",
                tr_id::ORDER_HISTORY,
                &[
                    ("CANO", config.account_no.clone()),
                    ("ACNT_PRDT_CD", config.account_product_code.clone()),
                    ("INQR_STRT_DT", today.clone()),
                    ("INQR_END_DT", today),
                    ("SLL_BUY_DVSN_CD", "00".to_string()),
                    ("INQR_DVSN", "00".to_string()),
                    ("PDNO", String::new()),
                    ("CCLD_DVSN", "00".to_string()),
                    ("ORD_GNO_BRNO", String::new()),
                    ("ODNO", order_no.to_string()),
                    ("INQR_DVSN_3", "00".to_string()),
                    ("INQR_DVSN_1", String::new()),
                    ("CTX_AREA_FK100", String::new()),
                    ("CTX_AREA_NK100", String::new()),
                ],
                None,
            )
            .await?;

        if let Some(rows) = data["output1"].as_array() {
            for row in rows {
                let odno = row.get("odno").and_then(|v| v.as_str()).unwrap_or("");
                if odno != order_no {
                    continue;
                }
                let ord_qty = field_i64(row, "ord_qty");
                let filled_qty = field_i64(row, "tot_ccld_qty");
                let avg_price = field_dec(row, "avg_prvs");
                return Ok(OrderStatus {
                    filled: filled_qty > 0 && filled_qty >= ord_qty,
                    filled_qty,
                    avg_price: (avg_price > Decimal::ZERO).then_some(avg_price),
                });
            }
        }

        // 당일 조회에 아직 반영 전 — 미체결로 취급
        Ok(OrderStatus {
            filled: false,
            filled_qty: 0,
            avg_price: None,
        })
    }

    // ==================== 계좌 ====================

    /// 잔고 조회 (TTTC8434R). 현금은 매수가능금액 API 우선.
    pub async fn get_balance(&self) -> Result<PortfolioState, GatewayError> {
        let config = self.auth.config();
        let data = self
            .request(
                Method::GET,
                "/uapi/domestic-stock/v1/trading/inquire-balance",
                tr_id::BALANCE,
                &[
                    ("CANO", config.account_no.clone()),
                    ("ACNT_PRDT_CD", config.account_product_code.clone()),
                    ("AFHR_FLPR_YN", "N".to_string()),
                    ("OFL_YN", String::new()),
                    ("INQR_DVSN", "02".to_string()),
                    ("UNPR_DVSN", "01".to_string()),
                    ("FUND_STTL_ICLD_YN", "N".to_string()),
                    ("FNCG_AMT_AUTO_RDPT_YN", "N".to_string()),
                    ("PRCS_DVSN", "01".to_string()),
                    ("CTX_AREA_FK100", String::new()),
                    ("CTX_AREA_NK100", String::new()),
                ],
                None,
            )
            .await?;

        let mut positions = Vec::new();
        if let Some(rows) = data["output1"].as_array() {
            for row in rows {
                let quantity = field_i64(row, "hldg_qty");
                if quantity <= 0 {
                    continue;
                }
                let Some(code_str) = row.get("pdno").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Ok(stock_code) = StockCode::new(code_str) else {
                    // 선물/ETN 등 6자리 외 상품은 코어 관리 대상 아님
                    continue;
                };
                positions.push(Position {
                    stock_code,
                    stock_name: row
                        .get("prdt_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    quantity,
                    average_buy_price: field_dec(row, "pchs_avg_pric").trunc(),
                    total_buy_amount: field_dec(row, "pchs_amt"),
                    sector_group: None,
                    high_watermark: Decimal::ZERO,
                    stop_loss_price: Decimal::ZERO,
                    bought_at: None,
                    current_value: Some(field_dec(row, "evlu_amt")),
                    current_price: Some(field_dec(row, "prpr")),
                });
            }
        }

        let summary = data["output2"]
            .as_array()
            .and_then(|rows| rows.first())
            .cloned()
            .unwrap_or(Value::Null);

        // 매수가능금액이 실제 주문 가능한 정확한 금액 — 실패 시 예수금 폴백
        let cash_balance = match self.get_buying_power().await {
            Ok(power) => power,
            Err(e) => {
                warn!(error = %e, "매수가능금액 조회 실패 — 예수금 폴백");
                field_dec(&summary, "prvs_rcdl_excc_amt")
            }
        };

        let stock_eval = field_dec(&summary, "scts_evlu_amt");

        Ok(PortfolioState {
            position_count: positions.len(),
            positions,
            cash_balance,
            total_asset: cash_balance + stock_eval,
            stock_eval_amount: stock_eval,
            timestamp: Utc::now(),
        })
    }

    /// 미수 없는 매수가능금액 (TTTC8908R).
    pub async fn get_buying_power(&self) -> Result<Decimal, GatewayError> {
        let config = self.auth.config();
        let data = self
            .request(
                Method::GET,
                "/uapi/domestic-stock/v1/trading/inquire-psbl-order",
                tr_id::BUYING_POWER,
                &[
                    ("CANO", config.account_no.clone()),
                    ("ACNT_PRDT_CD", config.account_product_code.clone()),
                    ("PDNO", "005930".to_string()),
                    ("ORD_UNPR", "0".to_string()),
                    ("ORD_DVSN", "01".to_string()),
                    ("CMA_EVLU_AMT_ICLD_YN", "Y".to_string()),
                    ("OVRS_ICLD_YN", "N".to_string()),
                ],
                None,
            )
            .await?;

        let output = &data["output"];
        let nrcvb = field_dec(output, "nrcvb_buy_amt");
        if nrcvb > Decimal::ZERO {
            return Ok(nrcvb);
        }
        Ok(field_dec(output, "ord_psbl_cash"))
    }

    /// 거래일 여부 (CTCA0903R). API 실패 시 주말 체크 폴백.
    pub async fn is_trading_day(&self, date: NaiveDate) -> Result<bool, GatewayError> {
        let target = date.format("%Y%m%d").to_string();
        let result = self
            .request(
                Method::GET,
                "/uapi/domestic-stock/v1/quotations/chk-holiday",
                tr_id::HOLIDAY,
                &[
                    ("BASS_DT", target.clone()),
                    ("CTX_AREA_NK", String::new()),
                    ("CTX_AREA_FK", String::new()),
                ],
                None,
            )
            .await;

        match result {
            Ok(data) => {
                if let Some(rows) = data["output"].as_array() {
                    for row in rows {
                        if row.get("bass_dt").and_then(|v| v.as_str()) == Some(target.as_str()) {
                            let open = row.get("opnd_yn").and_then(|v| v.as_str()) == Some("Y");
                            return Ok(open);
                        }
                    }
                }
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "휴장일 조회 실패 — 주말 체크 폴백");
                use chrono::Datelike;
                Ok(date.weekday().num_days_from_monday() < 5)
            }
        }
    }
}

// ==================== 필드 파싱 ====================

/// 문자열 숫자 필드 → Decimal. 없거나 파싱 실패 시 0.
fn field_dec(value: &Value, key: &str) -> Decimal {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s.trim()).ok())
        .unwrap_or(Decimal::ZERO)
}

fn field_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|f| f as i64)
        .unwrap_or(0)
}

fn field_f64(value: &Value, key: &str) -> Option<f64> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn field_parsers_handle_kis_string_numbers() {
        let row = json!({
            "stck_prpr": "72100",
            "acml_vol": "1234567",
            "pchs_avg_pric": "72120.0000",
            "prdy_ctrt": "1.52",
            "per": "",
        });
        assert_eq!(field_dec(&row, "stck_prpr"), dec!(72100));
        assert_eq!(field_i64(&row, "acml_vol"), 1_234_567);
        assert_eq!(field_dec(&row, "pchs_avg_pric"), dec!(72120.0000));
        assert_eq!(field_f64(&row, "prdy_ctrt"), Some(1.52));
        assert_eq!(field_f64(&row, "per"), None);
        assert_eq!(field_dec(&row, "missing"), Decimal::ZERO);
    }
}
