//! 도메인 에러 타입.

use thiserror::Error;

/// 도메인 레코드 검증 및 설정 로드 에러.
#[derive(Debug, Error)]
pub enum DomainError {
    /// 종목코드 형식 위반 (6자리 숫자 아님)
    #[error("잘못된 종목코드: {0}")]
    InvalidStockCode(String),

    /// 레코드 불변식 위반
    #[error("불변식 위반: {0}")]
    InvariantViolation(String),

    /// 설정 로드 실패
    #[error("설정 오류: {0}")]
    Config(String),
}
