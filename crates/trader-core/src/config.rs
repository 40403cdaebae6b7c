//! 환경변수 기반 설정 스냅샷.
//!
//! 모든 튜너블은 환경변수로 주입되며, 각 프로세스는 기동 시 한 번만
//! 읽습니다. 핫 리로드 없음.

use std::time::Duration;

use crate::domain::enums::MarketRegime;
use crate::error::DomainError;

/// Redis 연결 설정.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    fn from_env() -> Self {
        Self {
            url: env_var("REDIS_URL", "redis://localhost:6379/0"),
        }
    }
}

/// KIS OpenAPI 설정 — Gateway 프로세스만 자격증명을 보유.
#[derive(Debug, Clone)]
pub struct KisConfig {
    pub app_key: String,
    pub app_secret: String,
    pub account_no: String,
    pub account_product_code: String,
    pub base_url: String,
    pub ws_url: String,
    pub is_paper: bool,
    /// 토큰 캐시 파일 — 영속 볼륨에 마운트 필수 (토큰 발급은 전역 레이트 리밋)
    pub token_file_path: String,
    /// 피어 서비스가 접근하는 Gateway 주소
    pub gateway_url: String,
}

impl KisConfig {
    fn from_env() -> Self {
        let is_paper = env_var_bool("KIS_IS_PAPER", false);
        let default_ws = if is_paper {
            "ws://ops.koreainvestment.com:31000"
        } else {
            "ws://ops.koreainvestment.com:21000"
        };
        Self {
            app_key: env_var("KIS_APP_KEY", ""),
            app_secret: env_var("KIS_APP_SECRET", ""),
            account_no: env_var("KIS_ACCOUNT_NO", ""),
            account_product_code: env_var("KIS_ACCOUNT_PRODUCT_CODE", "01"),
            base_url: env_var("KIS_BASE_URL", "https://openapi.koreainvestment.com:9443"),
            ws_url: env_var("KIS_WS_URL", default_ws),
            is_paper,
            token_file_path: env_var("KIS_TOKEN_FILE_PATH", "/app/config/kis_token.json"),
            gateway_url: env_var("KIS_GATEWAY_URL", "http://kis-gateway:8080"),
        }
    }
}

/// Gateway 설정 — 레이트 리밋, 서킷 브레이커.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    /// 초당 토큰 수 (KIS 계정 전역 한도 20/s 아래로 여유)
    pub rate_limit_per_sec: u32,
    /// 토큰 획득 대기 한도 (초과 시 RATE_LIMITED)
    pub rate_acquire_timeout: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_window: Duration,
    pub breaker_open_duration: Duration,
    /// 업스트림 HTTP 타임아웃
    pub upstream_timeout: Duration,
}

impl GatewayConfig {
    fn from_env() -> Self {
        Self {
            bind_addr: env_var("GATEWAY_BIND_ADDR", "0.0.0.0:8080"),
            rate_limit_per_sec: env_var_parse("GATEWAY_RATE_LIMIT_PER_SEC", 19),
            rate_acquire_timeout: Duration::from_millis(env_var_parse(
                "GATEWAY_RATE_ACQUIRE_TIMEOUT_MS",
                2_000,
            )),
            breaker_failure_threshold: env_var_parse("GATEWAY_BREAKER_FAILURES", 5),
            breaker_window: Duration::from_secs(env_var_parse("GATEWAY_BREAKER_WINDOW_SECS", 30)),
            breaker_open_duration: Duration::from_secs(env_var_parse(
                "GATEWAY_BREAKER_OPEN_SECS",
                60,
            )),
            upstream_timeout: Duration::from_secs(env_var_parse("GATEWAY_UPSTREAM_TIMEOUT_SECS", 5)),
        }
    }
}

/// 포트폴리오 리스크 설정.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub max_portfolio_size: usize,
    /// 국면별 일일 매수 한도
    pub max_buy_count_bull: u32,
    pub max_buy_count_sideways: u32,
    pub max_buy_count_bear: u32,
    /// 국면별 현금 하한 (%)
    pub cash_floor_strong_bull_pct: f64,
    pub cash_floor_bull_pct: f64,
    pub cash_floor_sideways_pct: f64,
    pub cash_floor_bear_pct: f64,
    /// 섹터 금액 집중도 상한 (%) — STRONG_BULL 완화값 별도
    pub max_sector_value_pct: f64,
    pub max_sector_value_strong_bull_pct: f64,
    /// 종목 금액 집중도 상한 (%)
    pub max_stock_value_pct: f64,
    pub max_stock_value_strong_bull_pct: f64,
    pub stoploss_cooldown_days: u32,
    pub sell_cooldown_hours: u32,
    pub correlation_check_enabled: bool,
    pub correlation_block_threshold: f64,
    pub correlation_lookback_days: u32,
    /// hybrid_score 하드 플로어
    pub hard_floor_score: f64,
}

impl RiskConfig {
    fn from_env() -> Self {
        Self {
            max_portfolio_size: env_var_parse("RISK_MAX_PORTFOLIO_SIZE", 10),
            max_buy_count_bull: env_var_parse("RISK_MAX_BUY_COUNT_BULL", 8),
            max_buy_count_sideways: env_var_parse("RISK_MAX_BUY_COUNT_SIDEWAYS", 6),
            max_buy_count_bear: env_var_parse("RISK_MAX_BUY_COUNT_BEAR", 3),
            cash_floor_strong_bull_pct: env_var_parse("RISK_CASH_FLOOR_STRONG_BULL_PCT", 5.0),
            cash_floor_bull_pct: env_var_parse("RISK_CASH_FLOOR_BULL_PCT", 10.0),
            cash_floor_sideways_pct: env_var_parse("RISK_CASH_FLOOR_SIDEWAYS_PCT", 15.0),
            cash_floor_bear_pct: env_var_parse("RISK_CASH_FLOOR_BEAR_PCT", 25.0),
            max_sector_value_pct: env_var_parse("RISK_MAX_SECTOR_VALUE_PCT", 30.0),
            max_sector_value_strong_bull_pct: env_var_parse(
                "RISK_MAX_SECTOR_VALUE_STRONG_BULL_PCT",
                50.0,
            ),
            max_stock_value_pct: env_var_parse("RISK_MAX_STOCK_VALUE_PCT", 15.0),
            max_stock_value_strong_bull_pct: env_var_parse(
                "RISK_MAX_STOCK_VALUE_STRONG_BULL_PCT",
                25.0,
            ),
            stoploss_cooldown_days: env_var_parse("RISK_STOPLOSS_COOLDOWN_DAYS", 3),
            sell_cooldown_hours: env_var_parse("RISK_SELL_COOLDOWN_HOURS", 24),
            correlation_check_enabled: env_var_bool("RISK_CORRELATION_CHECK_ENABLED", true),
            correlation_block_threshold: env_var_parse("RISK_CORRELATION_BLOCK_THRESHOLD", 0.85),
            correlation_lookback_days: env_var_parse("RISK_CORRELATION_LOOKBACK_DAYS", 60),
            hard_floor_score: env_var_parse("RISK_HARD_FLOOR_SCORE", 40.0),
        }
    }

    /// 국면별 현금 하한 (%).
    pub fn cash_floor_pct(&self, regime: MarketRegime) -> f64 {
        match regime {
            MarketRegime::StrongBull => self.cash_floor_strong_bull_pct,
            MarketRegime::Bull => self.cash_floor_bull_pct,
            MarketRegime::Sideways => self.cash_floor_sideways_pct,
            MarketRegime::Bear | MarketRegime::StrongBear => self.cash_floor_bear_pct,
        }
    }

    /// 국면별 일일 매수 한도.
    pub fn daily_buy_limit(&self, regime: MarketRegime) -> u32 {
        match regime {
            MarketRegime::StrongBull | MarketRegime::Bull => self.max_buy_count_bull,
            MarketRegime::Sideways => self.max_buy_count_sideways,
            MarketRegime::Bear | MarketRegime::StrongBear => self.max_buy_count_bear,
        }
    }

    /// 국면별 섹터 집중도 상한 (%).
    pub fn sector_value_cap_pct(&self, regime: MarketRegime) -> f64 {
        if regime == MarketRegime::StrongBull {
            self.max_sector_value_strong_bull_pct
        } else {
            self.max_sector_value_pct
        }
    }

    /// 국면별 종목 집중도 상한 (%).
    pub fn stock_value_cap_pct(&self, regime: MarketRegime) -> f64 {
        if regime == MarketRegime::StrongBull {
            self.max_stock_value_strong_bull_pct
        } else {
            self.max_stock_value_pct
        }
    }
}

/// Scanner 설정.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub min_required_bars: usize,
    pub signal_cooldown_seconds: u64,
    /// RSI 가드 상한 — SIDEWAYS/BEAR
    pub rsi_guard_max: f64,
    /// RSI 가드 상한 — BULL/STRONG_BULL
    pub rsi_guard_max_bull: f64,
    /// VWAP 상방 이격 한도 (비율, 0.02 = 2%)
    pub vwap_deviation_warning: f64,
    pub no_trade_window_start: String,
    pub no_trade_window_end: String,
    pub danger_zone_start: String,
    pub danger_zone_end: String,
    pub watchlist_reload_secs: u64,
    // 전략 토글/파라미터
    pub momentum_min_gain_pct: f64,
    pub momentum_max_gain_pct: f64,
    pub momentum_min_volume_ratio: f64,
    pub momentum_confirmation_bars: u32,
    pub continuation_window_start: String,
    pub continuation_window_end: String,
    pub golden_cross_min_volume_ratio: f64,
    pub volume_breakout_ratio: f64,
    pub conviction_entry_enabled: bool,
    pub conviction_min_hybrid_score: f64,
    pub conviction_min_llm_score: f64,
    pub conviction_window_start: String,
    pub conviction_window_end: String,
    pub orb_enabled: bool,
    pub orb_range_end: String,
    pub orb_breakout_end: String,
}

impl ScannerConfig {
    fn from_env() -> Self {
        Self {
            min_required_bars: env_var_parse("SCANNER_MIN_REQUIRED_BARS", 20),
            signal_cooldown_seconds: env_var_parse("SCANNER_SIGNAL_COOLDOWN_SECONDS", 600),
            rsi_guard_max: env_var_parse("SCANNER_RSI_GUARD_MAX", 75.0),
            rsi_guard_max_bull: env_var_parse("SCANNER_RSI_GUARD_MAX_BULL", 85.0),
            vwap_deviation_warning: env_var_parse("SCANNER_VWAP_DEVIATION_WARNING", 0.02),
            no_trade_window_start: env_var("SCANNER_NO_TRADE_WINDOW_START", "09:00"),
            no_trade_window_end: env_var("SCANNER_NO_TRADE_WINDOW_END", "09:15"),
            danger_zone_start: env_var("SCANNER_DANGER_ZONE_START", "14:00"),
            danger_zone_end: env_var("SCANNER_DANGER_ZONE_END", "15:00"),
            watchlist_reload_secs: env_var_parse("SCANNER_WATCHLIST_RELOAD_SECS", 300),
            momentum_min_gain_pct: env_var_parse("SCANNER_MOMENTUM_MIN_GAIN_PCT", 1.5),
            momentum_max_gain_pct: env_var_parse("SCANNER_MOMENTUM_MAX_GAIN_PCT", 7.0),
            momentum_min_volume_ratio: env_var_parse("SCANNER_MOMENTUM_MIN_VOLUME_RATIO", 1.5),
            momentum_confirmation_bars: env_var_parse("SCANNER_MOMENTUM_CONFIRMATION_BARS", 1),
            continuation_window_start: env_var("SCANNER_CONTINUATION_WINDOW_START", "09:15"),
            continuation_window_end: env_var("SCANNER_CONTINUATION_WINDOW_END", "10:30"),
            golden_cross_min_volume_ratio: env_var_parse(
                "SCANNER_GOLDEN_CROSS_MIN_VOLUME_RATIO",
                1.5,
            ),
            volume_breakout_ratio: env_var_parse("SCANNER_VOLUME_BREAKOUT_RATIO", 3.0),
            conviction_entry_enabled: env_var_bool("SCANNER_CONVICTION_ENTRY_ENABLED", false),
            conviction_min_hybrid_score: env_var_parse("SCANNER_CONVICTION_MIN_HYBRID_SCORE", 70.0),
            conviction_min_llm_score: env_var_parse("SCANNER_CONVICTION_MIN_LLM_SCORE", 72.0),
            conviction_window_start: env_var("SCANNER_CONVICTION_WINDOW_START", "09:15"),
            conviction_window_end: env_var("SCANNER_CONVICTION_WINDOW_END", "10:30"),
            orb_enabled: env_var_bool("SCANNER_ORB_ENABLED", false),
            orb_range_end: env_var("SCANNER_ORB_RANGE_END", "09:15"),
            orb_breakout_end: env_var("SCANNER_ORB_BREAKOUT_END", "10:30"),
        }
    }

    /// 국면별 RSI 가드 상한.
    pub fn rsi_guard_limit(&self, regime: MarketRegime) -> f64 {
        if regime.is_bull() {
            self.rsi_guard_max_bull
        } else {
            self.rsi_guard_max
        }
    }
}

/// 매도(Exit) 설정.
#[derive(Debug, Clone)]
pub struct SellConfig {
    /// 고정 손절 기준 (%)
    pub stop_loss_pct: f64,
    pub hard_stop_pct: f64,
    pub atr_multiplier: f64,
    pub trailing_enabled: bool,
    pub trailing_activation_pct: f64,
    pub trailing_drop_from_high_pct: f64,
    pub profit_target_pct: f64,
    pub profit_floor_activation_pct: f64,
    pub profit_floor_level_pct: f64,
    // Profit Lock (ATR 기반 동적 트리거)
    pub profit_lock_l1_mult: f64,
    pub profit_lock_l1_min: f64,
    pub profit_lock_l1_max: f64,
    pub profit_lock_l1_floor: f64,
    pub profit_lock_l2_mult: f64,
    pub profit_lock_l2_min: f64,
    pub profit_lock_l2_max: f64,
    pub profit_lock_l2_floor: f64,
    pub breakeven_enabled: bool,
    pub breakeven_activation_pct: f64,
    pub breakeven_floor_pct: f64,
    pub rsi_overbought_threshold: f64,
    pub rsi_min_profit_pct: f64,
    pub max_holding_days: i64,
    pub time_tighten_enabled: bool,
    pub time_tighten_start_days: i64,
    pub time_tighten_start_days_bull: i64,
    pub time_tighten_max_reduction_pct: f64,
    pub death_cross_bear_only: bool,
    pub scale_out_enabled: bool,
    /// 최소 매도 금액 (원) — 미만이면 해당 사다리 스킵
    pub min_transaction_amount: i64,
    pub min_sell_quantity: i64,
}

impl SellConfig {
    fn from_env() -> Self {
        Self {
            stop_loss_pct: env_var_parse("SELL_STOP_LOSS_PCT", 6.0),
            hard_stop_pct: env_var_parse("SELL_HARD_STOP_PCT", 10.0),
            atr_multiplier: env_var_parse("SELL_ATR_MULTIPLIER", 2.0),
            trailing_enabled: env_var_bool("SELL_TRAILING_ENABLED", true),
            trailing_activation_pct: env_var_parse("SELL_TRAILING_ACTIVATION_PCT", 4.0),
            trailing_drop_from_high_pct: env_var_parse("SELL_TRAILING_DROP_FROM_HIGH_PCT", 3.0),
            profit_target_pct: env_var_parse("SELL_PROFIT_TARGET_PCT", 10.0),
            profit_floor_activation_pct: env_var_parse("SELL_PROFIT_FLOOR_ACTIVATION_PCT", 15.0),
            profit_floor_level_pct: env_var_parse("SELL_PROFIT_FLOOR_LEVEL_PCT", 10.0),
            profit_lock_l1_mult: env_var_parse("SELL_PROFIT_LOCK_L1_MULT", 1.5),
            profit_lock_l1_min: env_var_parse("SELL_PROFIT_LOCK_L1_MIN", 1.5),
            profit_lock_l1_max: env_var_parse("SELL_PROFIT_LOCK_L1_MAX", 3.0),
            profit_lock_l1_floor: env_var_parse("SELL_PROFIT_LOCK_L1_FLOOR", 0.7),
            profit_lock_l2_mult: env_var_parse("SELL_PROFIT_LOCK_L2_MULT", 2.5),
            profit_lock_l2_min: env_var_parse("SELL_PROFIT_LOCK_L2_MIN", 3.0),
            profit_lock_l2_max: env_var_parse("SELL_PROFIT_LOCK_L2_MAX", 5.0),
            profit_lock_l2_floor: env_var_parse("SELL_PROFIT_LOCK_L2_FLOOR", 2.0),
            breakeven_enabled: env_var_bool("SELL_BREAKEVEN_ENABLED", true),
            breakeven_activation_pct: env_var_parse("SELL_BREAKEVEN_ACTIVATION_PCT", 3.0),
            breakeven_floor_pct: env_var_parse("SELL_BREAKEVEN_FLOOR_PCT", 0.3),
            rsi_overbought_threshold: env_var_parse("SELL_RSI_OVERBOUGHT_THRESHOLD", 75.0),
            rsi_min_profit_pct: env_var_parse("SELL_RSI_MIN_PROFIT_PCT", 3.0),
            max_holding_days: env_var_parse("SELL_MAX_HOLDING_DAYS", 30),
            time_tighten_enabled: env_var_bool("SELL_TIME_TIGHTEN_ENABLED", true),
            time_tighten_start_days: env_var_parse("SELL_TIME_TIGHTEN_START_DAYS", 10),
            time_tighten_start_days_bull: env_var_parse("SELL_TIME_TIGHTEN_START_DAYS_BULL", 15),
            time_tighten_max_reduction_pct: env_var_parse("SELL_TIME_TIGHTEN_MAX_REDUCTION_PCT", 2.0),
            death_cross_bear_only: env_var_bool("SELL_DEATH_CROSS_BEAR_ONLY", true),
            scale_out_enabled: env_var_bool("SELL_SCALE_OUT_ENABLED", true),
            min_transaction_amount: env_var_parse("SELL_MIN_TRANSACTION_AMOUNT", 50_000),
            min_sell_quantity: env_var_parse("SELL_MIN_SELL_QUANTITY", 1),
        }
    }

    /// 국면별 스케일아웃 사다리 — (목표 수익률 %, 매도 비율 %).
    pub fn scale_out_levels(&self, regime: MarketRegime) -> &'static [(f64, f64)] {
        match regime {
            MarketRegime::StrongBull | MarketRegime::Bull => {
                &[(7.0, 25.0), (15.0, 25.0), (25.0, 15.0)]
            }
            MarketRegime::Sideways => &[(3.0, 25.0), (7.0, 25.0), (12.0, 25.0), (18.0, 15.0)],
            MarketRegime::Bear | MarketRegime::StrongBear => {
                &[(2.0, 25.0), (5.0, 25.0), (8.0, 25.0), (12.0, 15.0)]
            }
        }
    }

    /// 국면별 time-tightening 시작일.
    pub fn time_tighten_start(&self, regime: MarketRegime) -> i64 {
        if regime.is_bull() {
            self.time_tighten_start_days_bull
        } else {
            self.time_tighten_start_days
        }
    }
}

/// 실행기 설정 — 확인 폴링, 락 TTL, 사이징.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub confirm_poll_attempts: u32,
    pub confirm_poll_interval: Duration,
    pub confirm_deadline: Duration,
    pub buy_lock_ttl_secs: u64,
    pub sell_lock_ttl_secs: u64,
    /// 동일 종목 중복 주문 차단 윈도우
    pub duplicate_order_window_secs: u64,
    /// 모멘텀 지정가 프리미엄 (경험적 값, 설정 노출)
    pub momentum_limit_premium: f64,
    pub momentum_limit_timeout: Duration,
    /// 최소 주문 금액 (원) — 미만이면 TOO_SMALL
    pub min_order_amount: i64,
    pub hard_stop_retry_attempts: u32,
    pub hard_stop_retry_backoff: Duration,
}

impl ExecutorConfig {
    fn from_env() -> Self {
        Self {
            confirm_poll_attempts: env_var_parse("EXECUTOR_CONFIRM_POLL_ATTEMPTS", 3),
            confirm_poll_interval: Duration::from_secs(env_var_parse(
                "EXECUTOR_CONFIRM_POLL_INTERVAL_SECS",
                2,
            )),
            confirm_deadline: Duration::from_secs(env_var_parse(
                "EXECUTOR_CONFIRM_DEADLINE_SECS",
                10,
            )),
            buy_lock_ttl_secs: env_var_parse("EXECUTOR_BUY_LOCK_TTL_SECS", 180),
            sell_lock_ttl_secs: env_var_parse("EXECUTOR_SELL_LOCK_TTL_SECS", 30),
            duplicate_order_window_secs: env_var_parse("EXECUTOR_DUPLICATE_ORDER_WINDOW_SECS", 600),
            momentum_limit_premium: env_var_parse("EXECUTOR_MOMENTUM_LIMIT_PREMIUM", 0.003),
            momentum_limit_timeout: Duration::from_secs(env_var_parse(
                "EXECUTOR_MOMENTUM_LIMIT_TIMEOUT_SECS",
                10,
            )),
            min_order_amount: env_var_parse("EXECUTOR_MIN_ORDER_AMOUNT", 100_000),
            hard_stop_retry_attempts: env_var_parse("EXECUTOR_HARD_STOP_RETRY_ATTEMPTS", 3),
            hard_stop_retry_backoff: Duration::from_secs(env_var_parse(
                "EXECUTOR_HARD_STOP_RETRY_BACKOFF_SECS",
                2,
            )),
        }
    }
}

/// 텔레그램 운영자 알림 설정.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub enabled: bool,
}

impl TelegramConfig {
    fn from_env() -> Self {
        let bot_token = env_var("TELEGRAM_BOT_TOKEN", "");
        let chat_id = env_var("TELEGRAM_CHAT_ID", "");
        let enabled =
            env_var_bool("TELEGRAM_ENABLED", true) && !bot_token.is_empty() && !chat_id.is_empty();
        Self {
            bot_token,
            chat_id,
            enabled,
        }
    }
}

/// 최상위 설정 — 서브 설정 조합.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis: RedisConfig,
    pub kis: KisConfig,
    pub gateway: GatewayConfig,
    pub risk: RiskConfig,
    pub scanner: ScannerConfig,
    pub sell: SellConfig,
    pub executor: ExecutorConfig,
    pub telegram: TelegramConfig,
    /// 실주문 대신 센티널 성공을 반환하는 모드
    pub dry_run: bool,
}

impl AppConfig {
    /// 환경변수에서 전체 설정 로드. `.env` 파일이 있으면 먼저 읽습니다.
    pub fn from_env() -> Result<Self, DomainError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            redis: RedisConfig::from_env(),
            kis: KisConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            risk: RiskConfig::from_env(),
            scanner: ScannerConfig::from_env(),
            sell: SellConfig::from_env(),
            executor: ExecutorConfig::from_env(),
            telegram: TelegramConfig::from_env(),
            dry_run: env_var_bool("APP_DRY_RUN", false),
        })
    }
}

/// 환경변수 조회 (없으면 기본값).
fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// 환경변수 파싱 (실패 시 기본값).
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수 bool 파싱.
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cash_floor_by_regime() {
        let risk = RiskConfig::from_env();
        assert_eq!(risk.cash_floor_pct(MarketRegime::Bull), 10.0);
        assert_eq!(risk.cash_floor_pct(MarketRegime::Sideways), 15.0);
        assert_eq!(risk.cash_floor_pct(MarketRegime::Bear), 25.0);
        assert_eq!(risk.cash_floor_pct(MarketRegime::StrongBear), 25.0);
    }

    #[test]
    fn concentration_caps_relaxed_in_strong_bull() {
        let risk = RiskConfig::from_env();
        assert_eq!(risk.sector_value_cap_pct(MarketRegime::Sideways), 30.0);
        assert_eq!(risk.sector_value_cap_pct(MarketRegime::StrongBull), 50.0);
        assert_eq!(risk.stock_value_cap_pct(MarketRegime::Bull), 15.0);
        assert_eq!(risk.stock_value_cap_pct(MarketRegime::StrongBull), 25.0);
    }

    #[test]
    fn scale_out_ladders_per_regime() {
        let sell = SellConfig::from_env();
        assert_eq!(
            sell.scale_out_levels(MarketRegime::Bull),
            &[(7.0, 25.0), (15.0, 25.0), (25.0, 15.0)]
        );
        assert_eq!(sell.scale_out_levels(MarketRegime::Sideways).len(), 4);
        assert_eq!(
            sell.scale_out_levels(MarketRegime::Bear)[0],
            (2.0, 25.0)
        );
    }

    #[test]
    fn rsi_guard_limit_by_regime() {
        let scanner = ScannerConfig::from_env();
        assert_eq!(scanner.rsi_guard_limit(MarketRegime::Sideways), 75.0);
        assert_eq!(scanner.rsi_guard_limit(MarketRegime::StrongBull), 85.0);
    }

    #[test]
    fn time_tighten_start_by_regime() {
        let sell = SellConfig::from_env();
        assert_eq!(sell.time_tighten_start(MarketRegime::Bull), 15);
        assert_eq!(sell.time_tighten_start(MarketRegime::Sideways), 10);
    }
}
