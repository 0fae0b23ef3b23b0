//! French date/time rendering for exports. All instants are stored in UTC and
//! printed as UTC.

use chrono::{DateTime, Locale, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

const LOCALE: Locale = Locale::fr_FR;

fn as_utc(value: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&value)
}

/// `25/12/2024`
pub fn format_date(value: NaiveDate) -> String {
    value.format("%d/%m/%Y").to_string()
}

/// `14:05:09`
pub fn format_time(value: NaiveDateTime) -> String {
    value.format("%H:%M:%S").to_string()
}

/// `25/12/2024 à 14:05`
pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format("%d/%m/%Y à %H:%M").to_string()
}

/// `mercredi 25 décembre 2024`
pub fn format_long_date(value: NaiveDate) -> String {
    let midnight = value.and_time(NaiveTime::default());
    as_utc(midnight)
        .format_localized("%A %-d %B %Y", LOCALE)
        .to_string()
}

/// `1,5 Mo`, `820 o`: byte sizes with a decimal comma.
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["o", "Ko", "Mo", "Go"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes.max(0), UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit]).replace('.', ",")
    }
}
