use std::fmt;

use serde::Serialize;

pub const UNKNOWN_ASSOCIATION: &str = "UNKNOWN";
pub const DEFAULT_MEMBER_TYPE: &str = "Owner";

/// Short code of the organization a directory came from. Resolved once per
/// document and stamped on every record extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Association(String);

impl Association {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_ASSOCIATION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_ASSOCIATION
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized output row. Serialized field names double as the CSV header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRecord {
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Property")]
    pub property: String,
    #[serde(rename = "Street")]
    pub street: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Zip")]
    pub zip: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Units")]
    pub units: u32,
    #[serde(rename = "URL")]
    pub profile_url: String,
    #[serde(rename = "Association")]
    pub association: Association,
    #[serde(rename = "Member Type")]
    pub member_type: String,
}

impl CanonicalRecord {
    /// Single-line address as the sink's full-address field expects it.
    pub fn full_address(&self) -> String {
        format!("{} {} {} {}", self.street, self.city, self.state, self.zip)
    }
}

/// Field tuple produced by extraction, tagged with the layout it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRow {
    /// Multi-line listing block. The locator is synthesized from the name.
    Listing {
        name: String,
        street: String,
        locality: String,
        profile_url: String,
    },
    /// Email-anchored directory line.
    Contact {
        company: String,
        contact: String,
        address: String,
        phone: String,
        email: String,
        units: String,
        profile_url: Option<String>,
    },
    /// company, property, street, city, state, zip, phone, email, units,
    /// association, member type
    Canonical(Box<[String; 11]>),
    /// company, property, address, phone, email, units
    Compact([String; 6]),
    /// company, property, address (first half), address (second half),
    /// phone, email, units
    SplitAddress([String; 7]),
    /// Any tuple matching none of the layouts above.
    Unrecognized(Vec<String>),
}

impl RawRow {
    /// Wrap a CSV record by exact width, checked 11, then 6, then 7.
    pub fn from_csv_fields(fields: Vec<String>) -> Self {
        let fields = match <[String; 11]>::try_from(fields) {
            Ok(f) => return Self::Canonical(Box::new(f)),
            Err(f) => f,
        };
        let fields = match <[String; 6]>::try_from(fields) {
            Ok(f) => return Self::Compact(f),
            Err(f) => f,
        };
        match <[String; 7]>::try_from(fields) {
            Ok(f) => Self::SplitAddress(f),
            Err(f) => Self::Unrecognized(f),
        }
    }

    /// Positional view of the row.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Listing {
                name,
                street,
                locality,
                profile_url,
            } => vec![
                name.as_str(),
                street.as_str(),
                locality.as_str(),
                profile_url.as_str(),
            ],
            Self::Contact {
                company,
                contact,
                address,
                phone,
                email,
                units,
                profile_url,
            } => {
                let mut fields = vec![
                    company.as_str(),
                    contact.as_str(),
                    address.as_str(),
                    phone.as_str(),
                    email.as_str(),
                    units.as_str(),
                ];
                if let Some(url) = profile_url {
                    fields.push(url.as_str());
                }
                fields
            }
            Self::Canonical(f) => f.iter().map(String::as_str).collect(),
            Self::Compact(f) => f.iter().map(String::as_str).collect(),
            Self::SplitAddress(f) => f.iter().map(String::as_str).collect(),
            Self::Unrecognized(f) => f.iter().map(String::as_str).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.fields().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn csv_width_dispatch() {
        assert!(matches!(RawRow::from_csv_fields(strings(11)), RawRow::Canonical(_)));
        assert!(matches!(RawRow::from_csv_fields(strings(6)), RawRow::Compact(_)));
        assert!(matches!(RawRow::from_csv_fields(strings(7)), RawRow::SplitAddress(_)));
        for n in [0, 3, 5, 8, 10, 12] {
            let row = RawRow::from_csv_fields(strings(n));
            assert!(matches!(row, RawRow::Unrecognized(_)), "width {}", n);
            assert_eq!(row.arity(), n);
        }
    }

    #[test]
    fn contact_arity_depends_on_url() {
        let mut row = RawRow::Contact {
            company: "Acme".into(),
            contact: "Jo".into(),
            address: "1 A St X TX 77001".into(),
            phone: "".into(),
            email: "jo@acme.com".into(),
            units: "".into(),
            profile_url: None,
        };
        assert_eq!(row.arity(), 6);
        if let RawRow::Contact { profile_url, .. } = &mut row {
            *profile_url = Some("https://example.com/acme".into());
        }
        assert_eq!(row.arity(), 7);
        assert_eq!(row.fields()[6], "https://example.com/acme");
    }

    #[test]
    fn association_display() {
        assert_eq!(Association::new("HAA").to_string(), "HAA");
        assert!(Association::unknown().is_unknown());
    }
}
