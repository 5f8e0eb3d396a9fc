//! Tests for the filename mask
//!
//! These tests verify:
//! - strftime masks
//! - Legacy token masks
//! - Millisecond record times
//! - Invalid masks

use timeranger::content::FilenameMask;
use timeranger::TrangerError;

/// 2023-11-14T22:13:20Z
const T: u64 = 1_700_000_000;

#[test]
fn test_default_daily_mask() {
    let mask = FilenameMask::new("%Y-%m-%d").unwrap();

    assert_eq!(mask.bucket(0, false).unwrap(), "1970-01-01");
    assert_eq!(mask.bucket(T, false).unwrap(), "2023-11-14");
}

#[test]
fn test_hourly_mask() {
    let mask = FilenameMask::new("%Y%m%d-%H").unwrap();
    assert_eq!(mask.bucket(T, false).unwrap(), "20231114-22");
}

#[test]
fn test_millisecond_times() {
    let mask = FilenameMask::new("%Y-%m-%d").unwrap();
    assert_eq!(mask.bucket(T * 1000, true).unwrap(), "2023-11-14");
}

#[test]
fn test_same_day_same_bucket() {
    let mask = FilenameMask::new("%Y-%m-%d").unwrap();
    let day_start = 1_699_920_000; // 2023-11-14T00:00:00Z

    assert_eq!(
        mask.bucket(day_start, false).unwrap(),
        mask.bucket(day_start + 86_399, false).unwrap()
    );
    assert_ne!(
        mask.bucket(day_start, false).unwrap(),
        mask.bucket(day_start + 86_400, false).unwrap()
    );
}

// =============================================================================
// Legacy Masks
// =============================================================================

#[test]
fn test_legacy_tokens() {
    let mask = FilenameMask::new("CCYY-MM-DD").unwrap();
    assert_eq!(mask.bucket(T, false).unwrap(), "2023-11-14");

    let mask = FilenameMask::new("DD/MM/CCYY").unwrap();
    assert_eq!(mask.bucket(T, false).unwrap(), "14/11/2023");

    let mask = FilenameMask::new("YYMMDD-HH").unwrap();
    assert_eq!(mask.bucket(T, false).unwrap(), "231114-22");
}

#[test]
fn test_legacy_day_of_year() {
    let mask = FilenameMask::new("CCYY-ZZZ").unwrap();
    assert_eq!(mask.bucket(T, false).unwrap(), "2023-318");
}

#[test]
fn test_mask_keeps_original_text() {
    let mask = FilenameMask::new("CCYY-MM").unwrap();
    assert_eq!(mask.as_str(), "CCYY-MM");
}

// =============================================================================
// Invalid Masks
// =============================================================================

#[test]
fn test_empty_mask() {
    assert!(matches!(FilenameMask::new(""), Err(TrangerError::Config(_))));
}

#[test]
fn test_dangling_percent() {
    assert!(matches!(
        FilenameMask::new("bucket-%"),
        Err(TrangerError::Config(_))
    ));
}
