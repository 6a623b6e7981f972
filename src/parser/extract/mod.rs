pub mod listing;
pub mod tabular;

use tracing::debug;

use crate::config::Lexicon;
use crate::record::{Association, RawRow};

/// Extraction layout, chosen once per document from its association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Multi-line blocks closed by a marker line.
    Listing,
    /// One email-anchored entry per line.
    Tabular,
}

impl Mode {
    pub fn for_association(association: &Association, lexicon: &Lexicon) -> Self {
        if association.as_str() == lexicon.listing.association {
            Mode::Listing
        } else {
            Mode::Tabular
        }
    }
}

/// Scan a whole document into raw rows. Lines that fit no layout are dropped.
pub fn extract_rows(text: &str, association: &Association, lexicon: &Lexicon) -> Vec<RawRow> {
    let mode = Mode::for_association(association, lexicon);
    let rows = match mode {
        Mode::Listing => listing::extract(text, &lexicon.listing),
        Mode::Tabular => tabular::extract(text, &lexicon.directory),
    };
    debug!("{:?} extraction produced {} rows", mode, rows.len());
    rows
}
