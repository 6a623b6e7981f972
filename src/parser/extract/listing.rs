use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::ListingConfig;
use crate::record::RawRow;

static BANNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\d[\d,]*\s+(?:results?\s+)?found\b").unwrap());
static STREET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+ ").unwrap());
static LOCALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",[ ]*[A-Z]{2}[ ]*\d{5}").unwrap());
static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]").unwrap());

/// Progress through one listing block.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Nothing is collected until the results banner shows up.
    AwaitingStart,
    Empty,
    Named {
        name: String,
    },
    Street {
        name: String,
        street: String,
    },
    /// Name, street and city/state/zip collected; waiting for the marker.
    /// `country` is set once the optional country line has been seen.
    Located {
        name: String,
        street: String,
        locality: String,
        country: bool,
    },
}

impl State {
    fn name(&self) -> Option<&str> {
        match self {
            State::Named { name }
            | State::Street { name, .. }
            | State::Located { name, .. } => Some(name.as_str()),
            State::AwaitingStart | State::Empty => None,
        }
    }
}

/// Line-driven reader for directories that list each community as
///
/// ```text
/// Acme Villas
/// 100 Main St
/// Orlando, FL 32801
/// United States          (optional)
/// Apartment Community    (closes the block)
/// ```
pub struct ListingReader<'a> {
    cfg: &'a ListingConfig,
    county: String,
    marker: String,
    state: State,
    rows: Vec<RawRow>,
}

impl<'a> ListingReader<'a> {
    pub fn new(cfg: &'a ListingConfig, county: impl Into<String>) -> Self {
        Self {
            cfg,
            county: county.into(),
            marker: cfg.finalize_marker.to_lowercase(),
            state: State::AwaitingStart,
            rows: Vec::new(),
        }
    }

    /// Feed one trimmed, non-empty line.
    pub fn feed(&mut self, line: &str) {
        // Banners only count between blocks; mid-block they are ordinary lines
        match self.state {
            State::AwaitingStart => {
                if BANNER_RE.is_match(line) {
                    self.state = State::Empty;
                }
                return;
            }
            State::Empty if BANNER_RE.is_match(line) => return,
            _ => {}
        }
        // Listings repeat the name right under itself
        if self.state.name() == Some(line) {
            return;
        }

        let is_marker = line.to_lowercase().contains(&self.marker);
        let state = std::mem::replace(&mut self.state, State::Empty);

        self.state = match state {
            State::Empty if is_marker => State::Empty,
            State::Empty => State::Named {
                name: line.to_string(),
            },
            State::Named { name } if STREET_RE.is_match(line) => State::Street {
                name,
                street: line.to_string(),
            },
            State::Street { name, street } if LOCALITY_RE.is_match(line) => State::Located {
                name,
                street,
                locality: line.to_string(),
                country: false,
            },
            State::Located {
                name,
                street,
                locality,
                country: false,
            } if self.is_country(line) => State::Located {
                name,
                street,
                locality,
                country: true,
            },
            state if is_marker => {
                self.emit(state);
                State::Empty
            }
            // Four lines held: stray lines wait for the marker
            state @ State::Located { country: true, .. } => state,
            state => {
                debug!("Dropping listing block {:?} at line '{}'", state, line);
                State::Empty
            }
        };
    }

    /// Flush a complete block left open at end of input and return all rows.
    pub fn finish(mut self) -> Vec<RawRow> {
        let state = std::mem::replace(&mut self.state, State::Empty);
        self.emit(state);
        self.rows
    }

    fn emit(&mut self, state: State) {
        let State::Located {
            name,
            street,
            locality,
            ..
        } = state
        else {
            return;
        };
        let profile_url = profile_locator(&self.cfg.profile_base, &self.county, &name);
        self.rows.push(RawRow::Listing {
            name,
            street,
            locality,
            profile_url,
        });
    }

    fn is_country(&self, line: &str) -> bool {
        self.cfg
            .country_markers
            .iter()
            .any(|c| c.eq_ignore_ascii_case(line))
    }
}

/// Extract every listing block of a document.
pub fn extract(text: &str, cfg: &ListingConfig) -> Vec<RawRow> {
    let county = resolve_county(text, cfg);
    let mut reader = ListingReader::new(cfg, county);
    for line in text.lines() {
        let line = line.trim();
        if !line.is_empty() {
            reader.feed(line);
        }
    }
    reader.finish()
}

/// Profile path segment of the first county named anywhere in the document.
pub fn resolve_county<'c>(text: &str, cfg: &'c ListingConfig) -> &'c str {
    let upper = text.to_uppercase();
    cfg.counties
        .iter()
        .find(|c| upper.contains(&c.phrase.to_uppercase()))
        .map(|c| c.dir.as_str())
        .unwrap_or(cfg.default_county.as_str())
}

pub fn profile_locator(base: &str, county: &str, name: &str) -> String {
    let slug = SLUG_RE.replace_all(name, "").to_lowercase();
    format!("{}/{}/{}", base.trim_end_matches('/'), county, slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(text: &str) -> Vec<RawRow> {
        extract(text, &ListingConfig::default())
    }

    fn listing(name: &str, street: &str, locality: &str, url: &str) -> RawRow {
        RawRow::Listing {
            name: name.into(),
            street: street.into(),
            locality: locality.into(),
            profile_url: url.into(),
        }
    }

    #[test]
    fn single_block() {
        let text = "15 found from search\nAcme Villas\n100 Main St\nOrlando, FL 32801\nApartment Community\n";
        assert_eq!(
            rows(text),
            vec![listing(
                "Acme Villas",
                "100 Main St",
                "Orlando, FL 32801",
                "https://www.aago.org/OsceolaCounty/acmevillas"
            )]
        );
    }

    #[test]
    fn lines_before_banner_are_ignored() {
        let text = "Acme Villas\n100 Main St\nOrlando, FL 32801\nApartment Community\n";
        assert!(rows(text).is_empty());
    }

    #[test]
    fn incomplete_block_at_end_emits_nothing() {
        let text = "3 found from search\nAcme Villas\n100 Main St\n";
        assert!(rows(text).is_empty());
    }

    #[test]
    fn complete_block_at_end_is_flushed() {
        let text = "3 found from search\nAcme Villas\n100 Main St\nOrlando, FL 32801";
        let out = rows(text);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].arity(), 4);
    }

    #[test]
    fn duplicate_name_and_country_line() {
        let text = "\
2 found from search
  The Reserve at Lake Nona
The Reserve at Lake Nona
9001 Lake Nona Blvd
Orlando, FL 32827
United States
Apartment Community
";
        let out = rows(text);
        assert_eq!(out.len(), 1);
        if let RawRow::Listing { name, profile_url, .. } = &out[0] {
            assert_eq!(name, "The Reserve at Lake Nona");
            assert!(profile_url.ends_with("/thereserveatlakenona"));
        } else {
            panic!("expected listing row");
        }
    }

    #[test]
    fn out_of_sequence_line_resets_block() {
        let text = "\
10 found from search
Broken Place
Call for details
100 Main St
Orlando, FL 32801
Apartment Community
Good Place
200 Pine Ave
Kissimmee, FL 34741
Apartment Community
";
        let out = rows(text);
        // "Broken Place" is abandoned; "100 Main St" becomes a candidate name
        // and is abandoned too when the locality line does not fit
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], RawRow::Listing { name, .. } if name == "Good Place"));
    }

    #[test]
    fn stray_line_after_country_waits_for_marker() {
        let text = "\
1 found from search
Acme Villas
100 Main St
Orlando, FL 32801
USA
View Profile
Apartment Community
";
        assert_eq!(rows(text).len(), 1);
    }

    #[test]
    fn stray_line_without_country_drops_block() {
        let text = "\
1 found from search
Acme Villas
100 Main St
Orlando, FL 32801
View Profile
Apartment Community
";
        assert!(rows(text).is_empty());
    }

    #[test]
    fn marker_on_empty_buffer_is_not_a_name() {
        let text = "\
2 found from search
Apartment Community
Acme Villas
100 Main St
Orlando, FL 32801
apartment community
";
        let out = rows(text);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], RawRow::Listing { name, .. } if name == "Acme Villas"));
    }

    #[test]
    fn repeated_banner_is_skipped() {
        let text = "\
2 found from search
Acme Villas
100 Main St
Orlando, FL 32801
Apartment Community
2 found from search
Pine Court
5 Pine Ct
Sanford, FL 32771
Apartment Community
";
        assert_eq!(rows(text).len(), 2);
    }

    #[test]
    fn banner_shaped_street_stays_in_block() {
        let text = "\
1 found from search
Acme Villas
100 Found Ave
Orlando, FL 32801
Apartment Community
";
        let out = rows(text);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], RawRow::Listing { street, .. } if street == "100 Found Ave"));
    }

    #[test]
    fn county_from_document() {
        let text = "Seminole County communities\n1 found from search\nPine Court\n5 Pine Ct\nSanford, FL 32771\nApartment Community\n";
        let out = rows(text);
        assert!(matches!(
            &out[0],
            RawRow::Listing { profile_url, .. }
                if profile_url == "https://www.aago.org/SeminoleCounty/pinecourt"
        ));
    }

    #[test]
    fn county_lexicon_order_wins() {
        let cfg = ListingConfig::default();
        assert_eq!(resolve_county("lake county and osceola county", &cfg), "OsceolaCounty");
        assert_eq!(resolve_county("Orange County only", &cfg), "OrangeCounty");
        assert_eq!(resolve_county("no county here", &cfg), "OsceolaCounty");
    }

    #[test]
    fn locator_slug() {
        assert_eq!(
            profile_locator("https://www.aago.org/", "LakeCounty", "St. Mary's Landing #2"),
            "https://www.aago.org/LakeCounty/stmaryslanding2"
        );
    }

    #[test]
    fn fixture_document() {
        let text = std::fs::read_to_string("tests/fixtures/aago_listing.txt").unwrap();
        let out = rows(&text);
        assert_eq!(out.len(), 3, "got {:?}", out);
        assert!(out.iter().all(|r| matches!(r,
            RawRow::Listing { profile_url, .. } if profile_url.contains("/OrangeCounty/"))));
    }
}
