use tracing::debug;

/// Street / city / state / zip split of a free-text mailing address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

const COUNTRY_FIRST: &[&str] = &["UNITED", "USA"];
const COUNTRY_LAST: &[&str] = &["STATES", "AMERICA"];

/// Positional split: the last three tokens are city, state and zip; everything
/// before them is the street. Assumes a single-token city.
///
/// With fewer than four tokens (after dropping a trailing country pair) the
/// input is returned untouched as the street and the other parts stay empty.
pub fn decompose(full_address: &str) -> Address {
    if full_address.trim().is_empty() {
        return Address::default();
    }

    let cleaned = full_address.replace(',', "");
    let mut parts: Vec<&str> = cleaned.split_whitespace().collect();

    let n = parts.len();
    if n >= 2
        && COUNTRY_FIRST.contains(&parts[n - 2].to_uppercase().as_str())
        && COUNTRY_LAST.contains(&parts[n - 1].to_uppercase().as_str())
    {
        parts.truncate(n - 2);
    }

    if parts.len() < 4 {
        debug!("Cannot parse address: '{}'", full_address);
        return Address {
            street: full_address.to_string(),
            ..Address::default()
        };
    }

    let n = parts.len();
    Address {
        street: parts[..n - 3].join(" "),
        city: parts[n - 3].to_string(),
        state: parts[n - 2].to_string(),
        zip: parts[n - 1].to_string(),
    }
}
