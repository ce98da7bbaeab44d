use crate::default_struct;
use crate::modules::status::probe::StatusSnapshot;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

default_struct! {
/// Cosmetic knobs for the status embed. The MOTD indents reproduce the
/// layout the bot has always shipped with; they are constants of the look,
/// not of the protocol.
#[derive(Debug, Clone)]
pub struct EmbedStyle {
    pub title: String = "🌌 Server Status".to_string(),
    pub separator: String = "━".repeat(43),
    pub colour: (u8, u8, u8) = (120, 86, 255),
    pub motd_first_indent: usize = 8,
    pub motd_second_indent: usize = 7,
    pub unknown_count: String = "?".to_string(),
    pub footer: String = "Updated • UTC".to_string(),
}
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Fully rendered status message, independent of the Discord types so the
/// builder can be exercised without a client.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPayload {
    pub title: String,
    pub description: String,
    pub colour: (u8, u8, u8),
    pub fields: Vec<PayloadField>,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusPayload {
    pub fn to_embed(&self) -> serenity::CreateEmbed {
        let (r, g, b) = self.colour;
        let mut embed = serenity::CreateEmbed::new()
            .title(&self.title)
            .description(&self.description)
            .colour(serenity::Colour::from_rgb(r, g, b))
            .footer(serenity::CreateEmbedFooter::new(&self.footer))
            .timestamp(
                serenity::Timestamp::from_unix_timestamp(self.timestamp.timestamp())
                    .unwrap_or_else(|_| serenity::Timestamp::now()),
            );
        for field in &self.fields {
            embed = embed.field(&field.name, &field.value, field.inline);
        }
        embed
    }
}

/// Renders a snapshot (or its absence) into the display payload. Given the
/// same snapshot and instant the output is identical.
pub fn build_status_payload(
    style: &EmbedStyle,
    address: &str,
    snapshot: Option<&StatusSnapshot>,
    now: DateTime<Utc>,
) -> StatusPayload {
    let mut payload = StatusPayload {
        title: style.title.clone(),
        description: format!("**IP:** `{}`\n{}", address, style.separator),
        colour: style.colour,
        fields: Vec::new(),
        footer: style.footer.clone(),
        timestamp: now,
    };

    let Some(snapshot) = snapshot else {
        payload.fields.push(PayloadField {
            name: "❌ Server Offline".into(),
            value: format!("Not responding or shut down.\n{}", style.separator),
            inline: false,
        });
        return payload;
    };

    payload.fields.push(PayloadField {
        name: "⛏️ MOTD".into(),
        value: format!(
            "```\n{}\n```{}",
            layout_motd(style, &snapshot.description),
            style.separator
        ),
        inline: false,
    });

    let version = strip_format_codes(&snapshot.version_name);
    payload.fields.push(PayloadField {
        name: "🧩 Version".into(),
        value: if version.is_empty() {
            "Unknown".into()
        } else {
            version
        },
        inline: true,
    });

    payload.fields.push(PayloadField {
        name: "👥 Players".into(),
        value: format!(
            "**{}** / {}",
            format_count(style, snapshot.players_online),
            format_count(style, snapshot.players_max)
        ),
        inline: true,
    });

    payload
}

/// Unknown counts render as a placeholder, never as zero: a probe that could
/// not tell is not the same as an empty server.
pub fn format_count(style: &EmbedStyle, count: Option<u32>) -> String {
    count.map_or_else(|| style.unknown_count.clone(), |n| n.to_string())
}

/// Strips `§`-prefixed legacy format codes (hex digit or one of k/l/m/n/o/r,
/// case-insensitive). One pass leaves no sequence behind, including ones that
/// removal itself uncovers, so the function is idempotent.
pub fn strip_format_codes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if is_format_code(c) && out.ends_with('§') {
            out.pop();
        } else {
            out.push(c);
        }
    }
    out
}

fn is_format_code(c: char) -> bool {
    c.is_ascii_hexdigit() || matches!(c.to_ascii_lowercase(), 'k' | 'l' | 'm' | 'n' | 'o' | 'r')
}

/// Sanitize, left-trim every line, give the first two lines their fixed
/// indents, then center everything on the longest line.
fn layout_motd(style: &EmbedStyle, raw: &str) -> String {
    let cleaned = strip_format_codes(raw);
    let mut lines: Vec<String> = cleaned
        .split('\n')
        .map(|line| line.trim_start().to_string())
        .collect();

    if lines.len() >= 2 {
        lines = vec![
            format!("{}{}", " ".repeat(style.motd_first_indent), lines[0]),
            format!("{}{}", " ".repeat(style.motd_second_indent), lines[1]),
        ];
    }

    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    lines
        .iter()
        .map(|line| center(line, width))
        .collect::<Vec<_>>()
        .join("\n")
}

fn center(line: &str, width: usize) -> String {
    let len = line.chars().count();
    if len >= width {
        return line.to_string();
    }
    let left = (width - len) / 2;
    let right = width - len - left;
    format!("{}{}{}", " ".repeat(left), line, " ".repeat(right))
}
