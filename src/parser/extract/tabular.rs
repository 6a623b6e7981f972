use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::DirectoryConfig;
use crate::record::RawRow;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static COLUMN_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}|\t").unwrap());
static PHONE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\(\d{3}\)|\d{3}[-.]?)\d{3}[-.]?\d{4}$").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// One entry per line, anchored on the email address:
/// `company  contact  address  phone  email  units [url]`.
pub fn extract(text: &str, cfg: &DirectoryConfig) -> Vec<RawRow> {
    text.lines()
        .filter_map(|line| parse_line(line.trim(), cfg))
        .collect()
}

pub fn parse_line(line: &str, cfg: &DirectoryConfig) -> Option<RawRow> {
    if line.chars().count() < cfg.min_line_len || is_noise(line, cfg) {
        return None;
    }

    let email = EMAIL_RE.find(line)?;
    let before = line[..email.start()].trim();
    let after = line[email.end()..].trim();

    // A profile link after the email must not leak its digits into the units
    let (units_text, profile_url) = match URL_RE.find(after) {
        Some(m) => (
            format!("{} {}", &after[..m.start()], &after[m.end()..]),
            Some(m.as_str().to_string()),
        ),
        None => (after.to_string(), None),
    };
    let units: String = units_text.chars().filter(char::is_ascii_digit).collect();

    let Some([company, contact, address, phone]) = split_columns(before) else {
        debug!("Dropping line with too few columns: '{}'", line);
        return None;
    };

    Some(RawRow::Contact {
        company,
        contact,
        address,
        phone,
        email: email.as_str().to_string(),
        units,
        profile_url,
    })
}

fn is_noise(line: &str, cfg: &DirectoryConfig) -> bool {
    let lower = line.to_lowercase();
    cfg.noise_prefixes
        .iter()
        .any(|p| lower.starts_with(&p.to_lowercase()))
}

/// Company, contact, address and phone from the text before the email.
///
/// Columns are separated by runs of whitespace or tabs. When an export has
/// collapsed them to single spaces, the first phone-shaped token is used as
/// the boundary: two leading name tokens, the address, then the phone.
fn split_columns(before: &str) -> Option<[String; 4]> {
    let parts: Vec<&str> = COLUMN_SPLIT_RE.split(before).collect();
    if parts.len() >= 4 {
        return Some([
            parts[0].trim().to_string(),
            parts[1].trim().to_string(),
            parts[2].trim().to_string(),
            parts[3].trim().to_string(),
        ]);
    }

    let tokens: Vec<&str> = before.split_whitespace().collect();
    let phone_at = tokens
        .iter()
        .skip(2)
        .position(|t| PHONE_TOKEN_RE.is_match(t))?
        + 2;

    Some([
        tokens[0].to_string(),
        tokens[1].to_string(),
        tokens[2..phone_at].join(" "),
        tokens[phone_at].to_string(),
    ])
}
