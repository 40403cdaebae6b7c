//! KST 시계 유틸리티.
//!
//! KRX는 Asia/Seoul 고정이며 한국은 DST가 없으므로 +09:00 고정 오프셋이
//! 정확합니다.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};

/// KST(+09:00) 오프셋.
pub fn kst_offset() -> FixedOffset {
    // 9 * 3600은 항상 유효 범위
    FixedOffset::east_opt(9 * 3600).unwrap()
}

/// 현재 KST 시각.
pub fn kst_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&kst_offset())
}

/// "HH:MM" 문자열 파싱. 형식 위반 시 None.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// 반개구간 [start, end) 포함 여부.
pub fn within_window(current: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    start <= current && current < end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hhmm_parsing() {
        assert_eq!(
            parse_hhmm("09:00"),
            Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
        );
        assert_eq!(
            parse_hhmm("15:30"),
            Some(NaiveTime::from_hms_opt(15, 30, 0).unwrap())
        );
        assert!(parse_hhmm("9am").is_none());
    }

    #[test]
    fn window_is_half_open() {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(9, 15, 0).unwrap();
        assert!(within_window(start, start, end));
        assert!(within_window(
            NaiveTime::from_hms_opt(9, 14, 59).unwrap(),
            start,
            end
        ));
        assert!(!within_window(end, start, end));
    }
}
