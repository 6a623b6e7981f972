pub mod address;
pub mod classify;
pub mod extract;
pub mod normalize;
pub mod units;

use tracing::info;

use crate::config::Lexicon;
use crate::record::{Association, CanonicalRecord};
use normalize::DirectoryRule;

pub struct ProcessedDocument {
    pub association: Association,
    /// Rows the extractor produced, before normalization dropped any.
    pub raw_rows: usize,
    pub records: Vec<CanonicalRecord>,
}

/// Three-pass pipeline: classify the whole text once, extract raw rows, then
/// normalize each row with the document's association.
pub fn process_document(text: &str, lexicon: &Lexicon) -> ProcessedDocument {
    let association = classify::classify(text, lexicon);
    let rows = extract::extract_rows(text, &association, lexicon);

    let rule = DirectoryRule::new(lexicon);
    let records: Vec<CanonicalRecord> = rows
        .iter()
        .filter_map(|row| rule.normalize(row, &association))
        .collect();

    info!(
        "{}: {} rows extracted, {} records normalized",
        association,
        rows.len(),
        records.len()
    );

    ProcessedDocument {
        association,
        raw_rows: rows.len(),
        records,
    }
}
