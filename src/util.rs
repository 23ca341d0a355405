// Parsing, rounding and formatting helpers.
//
// Raw cells go through the `parse_*_safe` functions once, in the normalizer;
// rounding is applied once, when a report is assembled.
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Decimal places applied to monetary outputs.
pub const MONEY_DECIMALS: i32 = 4;
/// Decimal places applied to ratio and percentage outputs.
pub const RATIO_DECIMALS: i32 = 6;

/// Lenient numeric parse for exported cells: `" 1,234.5 "` is `1234.5`,
/// while blanks and anything with letters in it (`"12 USD"`) are `None`.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a date, accepting plain ISO dates, ISO date-times (time is dropped),
/// RFC 3339 timestamps and US-style `MM/DD/YYYY`.
pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

pub fn days_diff(start: NaiveDate, end: NaiveDate) -> f64 {
    (end - start).num_days() as f64
}

/// `YYYY-MM` period key for a date.
pub fn month_key(d: NaiveDate) -> String {
    format!("{:04}-{:02}", d.year(), d.month())
}

/// `YYYY-Www` ISO week key for a date.
pub fn iso_week_key(d: NaiveDate) -> String {
    let w = d.iso_week();
    format!("{:04}-W{:02}", w.year(), w.week())
}

pub fn round_to(v: f64, decimals: i32) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals);
    let rounded = (v * factor).round() / factor;
    // Avoid emitting -0.0.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Round a monetary value for output. Non-finite values become 0.0.
pub fn money(v: f64) -> f64 {
    round_to(v, MONEY_DECIMALS)
}

/// Round a ratio for output. Non-finite values become 0.0.
pub fn ratio(v: f64) -> f64 {
    round_to(v, RATIO_DECIMALS)
}

/// Round an optional ratio; non-finite values become null.
pub fn opt_ratio(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite()).map(ratio)
}

pub fn opt_money(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite()).map(money)
}

/// Fixed decimals with `en` thousands separators, e.g. `-1,234,567.89`.
pub fn format_number(n: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let mut out = whole
        .parse::<u64>()
        .map(|w| w.to_formatted_string(&Locale::en))
        .unwrap_or_else(|_| whole.to_string());
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    if n < 0.0 && out.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.insert(0, '-');
    }
    out
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_separated_numbers() {
        assert_eq!(parse_f64_safe(Some(" 1,234.5 ")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("12 USD")), None);
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn parses_common_date_shapes() {
        assert_eq!(parse_date_safe(Some("2025-11-18")), Some(d(2025, 11, 18)));
        assert_eq!(
            parse_date_safe(Some("2025-11-18 13:45:00")),
            Some(d(2025, 11, 18))
        );
        assert_eq!(
            parse_date_safe(Some("2025-11-18T13:45:00.250")),
            Some(d(2025, 11, 18))
        );
        assert_eq!(
            parse_date_safe(Some("2025-11-18T13:45:00-05:00")),
            Some(d(2025, 11, 18))
        );
        assert_eq!(parse_date_safe(Some("11/18/2025")), Some(d(2025, 11, 18)));
        assert_eq!(parse_date_safe(Some("not a date")), None);
    }

    #[test]
    fn period_keys() {
        assert_eq!(month_key(d(2025, 3, 9)), "2025-03");
        // 2024-12-30 belongs to ISO week 1 of 2025.
        assert_eq!(iso_week_key(d(2024, 12, 30)), "2025-W01");
    }

    #[test]
    fn rounding_is_finite() {
        assert_eq!(money(1.234_567_89), 1.2346);
        assert_eq!(ratio(1.0 / 6.0), 0.166_667);
        assert_eq!(ratio(f64::NAN), 0.0);
        assert_eq!(opt_ratio(Some(f64::INFINITY)), None);
        assert_eq!(money(-0.000_01), 0.0);
    }

    #[test]
    fn formats_with_separators() {
        assert_eq!(format_number(1_234_567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-12.5, 1), "-12.5");
        assert_eq!(format_int(9855), "9,855");
    }
}
