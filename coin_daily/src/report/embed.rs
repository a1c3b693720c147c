//! Chat embed rendering and length limits.
//!
//! Limits are counted in characters. `truncate` first cuts every oversized
//! text to its own limit (limit - 3 characters plus `...`). If the embed as a
//! whole is still above `MAX_TOTAL`, fields are dropped from the end one at
//! a time and the new last field is tagged with `OMITTED_MARKER`.

use chrono::{DateTime, Local, SecondsFormat};
use coin_common::AssetQuote;
use serde::Serialize;

use super::{DATA_SOURCE, REPORT_TITLE, format_percent, format_price};

/// Maximum total characters across title, description, fields and footer.
pub const MAX_TOTAL: usize = 6000;
/// Maximum title characters.
pub const MAX_TITLE: usize = 256;
/// Maximum description characters.
pub const MAX_DESCRIPTION: usize = 4096;
/// Maximum field name characters.
pub const MAX_FIELD_NAME: usize = 256;
/// Maximum field value characters.
pub const MAX_FIELD_VALUE: usize = 1024;
/// Maximum footer characters.
pub const MAX_FOOTER: usize = 2048;

/// Appended to the last field kept after fields had to be dropped.
pub const OMITTED_MARKER: &str = "\n... (more assets omitted)";

const ELLIPSIS: &str = "...";

/// Colour when advancers outnumber or equal decliners.
pub const COLOR_UP: u32 = 0x2E_CC_71;
/// Colour when decliners outnumber advancers.
pub const COLOR_DOWN: u32 = 0xE7_4C_3C;
/// Colour of an embed without quotes.
pub const COLOR_NEUTRAL: u32 = 0xFF_D7_00;

/// Rich message body understood by the chat API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    /// Heading.
    pub title: String,
    /// Text under the title; omitted when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Sidebar colour as `0xRRGGBB`.
    pub color: u32,
    /// One field per asset.
    pub fields: Vec<EmbedField>,
    /// Attribution line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// RFC 3339 time shown by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Name/value block inside an embed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    /// Field heading.
    pub name: String,
    /// Field body; markdown allowed.
    pub value: String,
    /// Render side by side with neighbouring inline fields.
    pub inline: bool,
}

/// Footer of an embed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    /// Footer text.
    pub text: String,
}

/// Build the report embed, one inline field per quote. Limits are not applied.
pub fn render(quotes: &[AssetQuote], now: DateTime<Local>) -> Embed {
    let advancing = quotes.iter().filter(|quote| quote.is_advancing()).count();
    let color = if quotes.is_empty() {
        COLOR_NEUTRAL
    } else if advancing * 2 >= quotes.len() {
        COLOR_UP
    } else {
        COLOR_DOWN
    };

    let fields = quotes
        .iter()
        .map(|quote| EmbedField {
            name: format!("{} ({})", quote.name, quote.display_symbol()),
            value: format!(
                "**${}**\n24h: {}",
                format_price(quote.current_price),
                format_percent(quote.price_change_percentage_24h)
            ),
            inline: true,
        })
        .collect();

    Embed {
        title: REPORT_TITLE.to_string(),
        description: now.format("%Y-%m-%d").to_string(),
        color,
        fields,
        footer: Some(EmbedFooter {
            text: DATA_SOURCE.to_string(),
        }),
        timestamp: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// Total characters counted against `MAX_TOTAL`.
pub fn total_length(embed: &Embed) -> usize {
    let fields: usize = embed
        .fields
        .iter()
        .map(|field| char_len(&field.name) + char_len(&field.value))
        .sum();
    let footer = embed.footer.as_ref().map_or(0, |footer| char_len(&footer.text));
    char_len(&embed.title) + char_len(&embed.description) + fields + footer
}

/// Apply every length limit.
pub fn truncate(mut embed: Embed) -> Embed {
    cut(&mut embed.title, MAX_TITLE);
    cut(&mut embed.description, MAX_DESCRIPTION);
    if let Some(footer) = embed.footer.as_mut() {
        cut(&mut footer.text, MAX_FOOTER);
    }
    for field in &mut embed.fields {
        cut(&mut field.name, MAX_FIELD_NAME);
        cut(&mut field.value, MAX_FIELD_VALUE);
    }

    while total_length(&embed) > MAX_TOTAL && !embed.fields.is_empty() {
        embed.fields.pop();
        if let Some(last) = embed.fields.last_mut() {
            mark_omitted(&mut last.value);
        }
    }

    let total = total_length(&embed);
    if total > MAX_TOTAL {
        let budget = char_len(&embed.description).saturating_sub(total - MAX_TOTAL);
        cut(&mut embed.description, budget);
    }
    embed
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn cut(text: &mut String, limit: usize) {
    if char_len(text) <= limit {
        return;
    }
    if limit < ELLIPSIS.len() {
        *text = text.chars().take(limit).collect();
        return;
    }
    let mut kept: String = text.chars().take(limit - ELLIPSIS.len()).collect();
    kept.push_str(ELLIPSIS);
    *text = kept;
}

fn mark_omitted(value: &mut String) {
    let room = MAX_FIELD_VALUE - char_len(OMITTED_MARKER);
    if char_len(value) > room {
        *value = value.chars().take(room).collect();
    }
    value.push_str(OMITTED_MARKER);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::{quote, sample};
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn field(name: &str, value: String) -> EmbedField {
        EmbedField {
            name: name.to_string(),
            value,
            inline: true,
        }
    }

    fn bare(fields: Vec<EmbedField>) -> Embed {
        Embed {
            title: "T".to_string(),
            description: String::new(),
            color: COLOR_UP,
            fields,
            footer: None,
            timestamp: None,
        }
    }

    #[test]
    fn renders_one_inline_field_per_quote() {
        let embed = render(&sample(), now());

        assert!(embed.title.contains("Price Report"));
        assert_eq!(embed.description, "2026-10-19");
        assert_eq!(embed.fields.len(), 2);
        let btc = &embed.fields[0];
        assert!(btc.name.contains("Bitcoin") && btc.name.contains("BTC"));
        assert!(btc.value.contains("45,000.00"));
        assert!(btc.value.contains("+2.27%"));
        assert!(btc.inline);
        assert!(embed.fields[1].value.contains("-1.75%"));
        assert!(embed.footer.is_some());
        assert!(embed.timestamp.is_some());
    }

    #[test]
    fn colour_follows_market_direction() {
        let up = render(&[quote("bitcoin", "btc", "Bitcoin", 45_000.0, 2.27)], now());
        let down = render(&[quote("bitcoin", "btc", "Bitcoin", 40_000.0, -11.11)], now());

        assert_eq!(up.color, COLOR_UP);
        assert_eq!(down.color, COLOR_DOWN);
        assert_ne!(down.color, 0);
    }

    #[test]
    fn empty_list_renders_without_fields() {
        let embed = render(&[], now());
        assert!(embed.fields.is_empty());
        assert_eq!(embed.color, COLOR_NEUTRAL);
    }

    #[test]
    fn long_field_value_is_cut_to_limit_with_ellipsis() {
        let embed = truncate(bare(vec![field("Bitcoin (BTC)", "9".repeat(1500))]));

        let value = &embed.fields[0].value;
        assert_eq!(value.chars().count(), MAX_FIELD_VALUE);
        assert!(value.ends_with("..."));
    }

    #[test]
    fn cuts_count_characters_not_bytes() {
        let embed = truncate(bare(vec![field(&"币".repeat(300), "ok".to_string())]));

        let name = &embed.fields[0].name;
        assert_eq!(name.chars().count(), MAX_FIELD_NAME);
        assert!(name.ends_with("..."));
    }

    #[test]
    fn title_and_description_are_cut() {
        let mut embed = bare(Vec::new());
        embed.title = "t".repeat(300);
        embed.description = "d".repeat(5000);

        let embed = truncate(embed);
        assert_eq!(embed.title.chars().count(), MAX_TITLE);
        assert_eq!(embed.description.chars().count(), MAX_DESCRIPTION);
    }

    #[test]
    fn drops_trailing_fields_until_total_fits() {
        let fields = (0..10)
            .map(|i| field(&format!("field-{:04}", i), "v".repeat(1000)))
            .collect();

        let embed = truncate(bare(fields));

        assert!(total_length(&embed) <= MAX_TOTAL);
        assert_eq!(embed.fields.len(), 5);
        assert_eq!(embed.fields[4].name, "field-0004");
        let last = &embed.fields[4].value;
        assert!(last.ends_with(OMITTED_MARKER));
        assert!(last.chars().count() <= MAX_FIELD_VALUE);
        assert!(!embed.fields[3].value.contains("omitted"));
    }

    #[test]
    fn small_embed_is_untouched() {
        let embed = render(&sample(), now());
        assert_eq!(truncate(embed.clone()), embed);
    }

    #[test]
    fn serializes_in_chat_api_shape() {
        let json = serde_json::to_value(bare(vec![field("a", "b".to_string())])).unwrap();
        assert_eq!(json["title"], "T");
        assert_eq!(json["fields"][0]["inline"], true);
        assert!(json.get("description").is_none());
        assert!(json.get("footer").is_none());
    }
}
