use tracing::debug;

use super::address::{decompose, Address};
use super::units::normalize_units;
use crate::config::Lexicon;
use crate::record::{Association, CanonicalRecord, RawRow, DEFAULT_MEMBER_TYPE};

/// Default association for CSV imports that do not carry one.
pub const CSV_DEFAULT_ASSOCIATION: &str = "HAA";

const JUNK_MARKERS: &[&str] = &["```", "...", "there are"];

/// Rule for rows scanned out of an uploaded directory document.
///
/// The listing association's rows are `[name, street, city/state/zip,
/// locator?]` and use the name for both company and property. Every other
/// association reads `[company, contact, address, phone?, email?, units?,
/// url?]` positionally.
pub struct DirectoryRule {
    listing: Association,
}

impl DirectoryRule {
    pub fn new(lexicon: &Lexicon) -> Self {
        Self {
            listing: Association::new(lexicon.listing.association.clone()),
        }
    }

    pub fn normalize(&self, row: &RawRow, association: &Association) -> Option<CanonicalRecord> {
        if *association == self.listing {
            return match row {
                RawRow::Listing {
                    name,
                    street,
                    locality,
                    profile_url,
                } => listing_record(name, street, locality, profile_url, association),
                other => {
                    let f = other.fields();
                    if f.len() < 3 {
                        return None;
                    }
                    let url = f.get(3).copied().unwrap_or_default();
                    listing_record(f[0], f[1], f[2], url, association)
                }
            };
        }

        let f = row.fields();
        if f.len() < 3 {
            debug!("Rejecting {}-field row: {:?}", f.len(), f);
            return None;
        }
        let at = |i: usize| f.get(i).map(|s| s.trim()).unwrap_or_default();
        let address = decompose(at(2));

        finish(CanonicalRecord {
            company: at(0).to_string(),
            property: at(1).to_string(),
            street: address.street,
            city: address.city,
            state: address.state,
            zip: address.zip,
            phone: at(3).to_string(),
            email: at(4).to_string(),
            units: normalize_units(Some(at(5))),
            profile_url: at(6).to_string(),
            association: association.clone(),
            member_type: DEFAULT_MEMBER_TYPE.to_string(),
        })
    }
}

fn listing_record(
    name: &str,
    street: &str,
    locality: &str,
    profile_url: &str,
    association: &Association,
) -> Option<CanonicalRecord> {
    let name = name.trim();
    let address = decompose(&format!("{} {}", street.trim(), locality.trim()));
    finish(CanonicalRecord {
        company: name.to_string(),
        property: name.to_string(),
        street: address.street,
        city: address.city,
        state: address.state,
        zip: address.zip,
        // filled in by enrichment
        phone: String::new(),
        email: String::new(),
        units: 0,
        profile_url: profile_url.trim().to_string(),
        association: association.clone(),
        member_type: DEFAULT_MEMBER_TYPE.to_string(),
    })
}

/// Rule for the standalone CSV import, where each record is one of three
/// fixed widths:
///
/// * 11 columns: already split (`company, property, street, city, state, zip,
///   phone, email, units, association, member type`)
/// * 6 columns: `company, property, address, phone, email, units`
/// * 7 columns: as 6, with the address spread over two columns
///
/// Anything else, or rows carrying markup fences, ellipses or prose, is
/// rejected.
pub struct CsvImportRule {
    association: Association,
}

impl CsvImportRule {
    pub fn new(association: Association) -> Self {
        Self { association }
    }

    pub fn normalize(&self, row: &RawRow) -> Option<CanonicalRecord> {
        let fields = row.fields();
        let text = fields.join(" ").to_lowercase();
        if fields.len() < 6 || JUNK_MARKERS.iter().any(|m| text.contains(m)) {
            debug!("Skipping junk row: {:?}", fields);
            return None;
        }

        match row {
            RawRow::Canonical(f) => {
                let [company, property, street, city, state, zip, phone, email, units, association, member_type] =
                    &**f;
                let association = match association.trim() {
                    "" => self.association.clone(),
                    code => Association::new(code),
                };
                let member_type = match member_type.trim() {
                    "" => DEFAULT_MEMBER_TYPE,
                    m => m,
                };
                finish(CanonicalRecord {
                    company: company.trim().to_string(),
                    property: property.trim().to_string(),
                    street: street.trim().to_string(),
                    city: city.trim().to_string(),
                    state: state.trim().to_string(),
                    zip: zip.trim().to_string(),
                    phone: phone.trim().to_string(),
                    email: email.trim().to_string(),
                    units: normalize_units(Some(units.as_str())),
                    profile_url: String::new(),
                    association,
                    member_type: member_type.to_string(),
                })
            }
            RawRow::Compact([company, property, address, phone, email, units]) => self.compact(
                company,
                property,
                decompose(address.trim()),
                phone,
                email,
                units,
            ),
            RawRow::SplitAddress([company, property, first, second, phone, email, units]) => {
                let merged = format!("{} {}", first.trim(), second.trim());
                self.compact(company, property, decompose(&merged), phone, email, units)
            }
            _ => {
                debug!("Unknown format, skipping {}-field row", row.arity());
                None
            }
        }
    }

    fn compact(
        &self,
        company: &str,
        property: &str,
        address: Address,
        phone: &str,
        email: &str,
        units: &str,
    ) -> Option<CanonicalRecord> {
        finish(CanonicalRecord {
            company: company.trim().to_string(),
            property: property.trim().to_string(),
            street: address.street,
            city: address.city,
            state: address.state,
            zip: address.zip,
            phone: phone.trim().to_string(),
            email: email.trim().to_string(),
            units: normalize_units(Some(units)),
            profile_url: String::new(),
            association: self.association.clone(),
            member_type: DEFAULT_MEMBER_TYPE.to_string(),
        })
    }
}

/// Records without a company or property name never leave the normalizer.
fn finish(record: CanonicalRecord) -> Option<CanonicalRecord> {
    if record.company.is_empty() || record.property.is_empty() {
        debug!("Dropping record without company/property: {:?}", record);
        return None;
    }
    Some(record)
}
