//! HTML document mailed by the email channel.

use chrono::NaiveDate;
use coin_common::AssetQuote;

use super::{DATA_SOURCE, REPORT_TITLE, format_change, format_large, format_percent, format_price};

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; margin: 20px; background-color: #f5f5f5; }
        .header, .footer { text-align: center; padding: 20px; background-color: white; border-radius: 8px; }
        .header { color: #2c3e50; margin-bottom: 30px; }
        .footer { color: #7f8c8d; font-size: 14px; margin-top: 30px; }
        .report-date { color: #7f8c8d; font-size: 16px; margin-top: 10px; }
        table { width: 100%; border-collapse: collapse; background-color: white; }
        th, td { padding: 12px; text-align: left; border-bottom: 1px solid #ecf0f1; }
        th { background-color: #34495e; color: white; }
        .positive { color: #27ae60; font-weight: bold; }
        .negative { color: #e74c3c; font-weight: bold; }
        .price { font-weight: bold; }
"#;

/// Render the report as a complete HTML document.
pub fn render(quotes: &[AssetQuote], date: NaiveDate) -> String {
    let date = date.format("%Y-%m-%d").to_string();
    let rows: String = quotes.iter().map(render_row).collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title} - {date}</title>
    <style>{style}</style>
</head>
<body>
    <div class="header">
        <h1>{title}</h1>
        <div class="report-date">{date}</div>
    </div>
    <table>
        <thead>
            <tr>
                <th>Asset</th>
                <th>Symbol</th>
                <th>Price (USD)</th>
                <th>24h Change</th>
                <th>24h Change %</th>
                <th>Market Cap</th>
                <th>24h Volume</th>
            </tr>
        </thead>
        <tbody>{rows}
        </tbody>
    </table>
    <div class="footer">
        <p>{source}</p>
        <p>Generated automatically by CoinDaily</p>
    </div>
</body>
</html>"#,
        title = REPORT_TITLE,
        date = date,
        style = STYLE,
        rows = rows,
        source = DATA_SOURCE,
    )
}

fn render_row(quote: &AssetQuote) -> String {
    format!(
        r#"
            <tr>
                <td><strong>{name}</strong></td>
                <td>{symbol}</td>
                <td class="price">${price}</td>
                <td class="{change_class}">{change}</td>
                <td class="{pct_class}">{pct}</td>
                <td>${market_cap}</td>
                <td>${volume}</td>
            </tr>"#,
        name = escape(&quote.name),
        symbol = escape(&quote.display_symbol()),
        price = format_price(quote.current_price),
        change_class = trend_class(quote.price_change_24h),
        change = format_change(quote.price_change_24h),
        pct_class = trend_class(quote.price_change_percentage_24h),
        pct = format_percent(quote.price_change_percentage_24h),
        market_cap = format_large(quote.market_cap),
        volume = format_large(quote.volume_24h),
    )
}

fn trend_class(change: f64) -> &'static str {
    if change < 0.0 { "negative" } else { "positive" }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::{quote, sample};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn renders_one_row_per_quote() {
        let html = render(&sample(), date());

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("2026-10-19"));
        assert_eq!(html.matches("<tr>").count(), 3);
        assert!(html.contains("<strong>Bitcoin</strong>"));
        assert!(html.contains("<td>BTC</td>"));
        assert!(html.contains("$45,000.00"));
        assert!(html.contains(r#"<td class="positive">+2.27%</td>"#));
        assert!(html.contains(r#"<td class="negative">-1.75%</td>"#));
    }

    #[test]
    fn escapes_names() {
        let html = render(&[quote("x", "x", "<b>X & Co</b>", 1.0, 0.0)], date());
        assert!(html.contains("&lt;b&gt;X &amp; Co&lt;/b&gt;"));
        assert!(!html.contains("<b>X"));
    }

    #[test]
    fn empty_list_renders_header_only() {
        let html = render(&[], date());
        assert_eq!(html.matches("<tr>").count(), 1);
    }
}
