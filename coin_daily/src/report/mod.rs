//! Report rendering.
//!
//! Rendering is a pure function of the fetched quotes:
//! - `html` — the HTML document mailed by the email channel.
//! - `embed` — the chat embed, with the chat API's length limits enforced.
//!
//! The number formatting helpers below are shared by both renderers.

pub mod embed;
pub mod html;

/// Title used by every rendering of the report.
pub const REPORT_TITLE: &str = "Daily Crypto Price Report";
/// Attribution shown under the report.
pub const DATA_SOURCE: &str = "Source: CoinGecko API";

/// Format a USD price. Sub-dollar prices keep more decimals.
pub fn format_price(value: f64) -> String {
    let magnitude = value.abs();
    let digits = if magnitude >= 1.0 {
        group_thousands(&format!("{:.2}", magnitude))
    } else if magnitude >= 0.01 {
        format!("{:.4}", magnitude)
    } else {
        format!("{:.8}", magnitude)
    };
    if value < 0.0 {
        format!("-{}", digits)
    } else {
        digits
    }
}

/// Format a large USD figure with a T/B/M/K suffix.
pub fn format_large(value: f64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];
    UNITS
        .iter()
        .find(|(scale, _)| value.abs() >= *scale)
        .map(|(scale, suffix)| format!("{:.2}{}", value / scale, suffix))
        .unwrap_or_else(|| format!("{:.2}", value))
}

/// Format a percentage change with an explicit sign.
pub fn format_percent(value: f64) -> String {
    format!("{:+.2}%", value)
}

/// Format an absolute change with an explicit sign, e.g. `+$1,000.00`.
pub fn format_change(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "+" };
    format!("{}${}", sign, format_price(value.abs()))
}

fn group_thousands(fixed: &str) -> String {
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed, ""));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3 + 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if !frac_part.is_empty() {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}
