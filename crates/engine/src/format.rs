//! German-locale display formatting.

use chrono::{DateTime, Local, TimeZone, Utc};

/// `dd.MM.yyyy, HH:mm:ss`
pub fn datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%d.%m.%Y, %H:%M:%S").to_string()
}

/// `dd.MM.yyyy`
pub fn date<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%d.%m.%Y").to_string()
}

pub fn local_datetime(dt: &DateTime<Utc>) -> String {
    datetime(&dt.with_timezone(&Local))
}

pub fn local_date(dt: &DateTime<Utc>) -> String {
    date(&dt.with_timezone(&Local))
}

/// Group an unsigned digit string with `.` every three digits.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

pub fn integer(n: i64) -> String {
    let grouped = group_thousands(&n.unsigned_abs().to_string());
    if n < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Fixed decimals with `,` as decimal separator and `.` grouping.
pub fn decimal(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let mut out = String::new();
    // -0,00 is shown as 0,00
    if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if !frac_part.is_empty() {
        out.push(',');
        out.push_str(frac_part);
    }
    out
}

/// `1.234,56 €`
pub fn currency(value: f64) -> String {
    format!("{} €", decimal(value, 2))
}

pub fn hours(h: i64) -> String {
    format!("{} h", integer(h))
}

/// Binary units with up to two decimals: `512 B`, `1,5 KB`, `2 GB`.
pub fn bytes(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size < 1024 {
        return format!("{} B", size);
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let mut text = decimal(value, 2);
    if text.contains(',') {
        text = text.trim_end_matches('0').trim_end_matches(',').to_string();
    }
    format!("{} {}", text, UNITS[unit])
}
