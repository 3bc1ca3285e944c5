// Reference search - comma-separated codes → matched records
// Exact, case-insensitive match; the user's order is kept

use crate::error::LocatorError;
use crate::records::{ApartmentRecord, RecordSet};
use serde::Serialize;
use tracing::warn;

/// Result of resolving one search input against the loaded records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    /// Matched records, in the order the codes were typed
    pub matched: Vec<ApartmentRecord>,
    /// Codes with no record (already logged)
    pub unmatched: Vec<String>,
}

impl SearchOutcome {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

/// Notice shown when a search matched nothing
pub const NO_MATCH_NOTICE: &str = "Aucun appartement trouvé avec cette/ces référence(s).";

/// Split a search input into normalized codes: trimmed, upper-cased,
/// blank segments removed.
pub fn split_codes(input: &str) -> Vec<String> {
    input
        .trim()
        .to_uppercase()
        .split(',')
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
        .collect()
}

/// Resolve `input` against `records`.
///
/// Empty input and an empty record set are rejected up front. Otherwise
/// this never fails: unknown codes are logged and reported in
/// `unmatched`, and zero matches is a valid outcome.
pub fn resolve(input: &str, records: &RecordSet) -> Result<SearchOutcome, LocatorError> {
    if input.trim().is_empty() {
        return Err(LocatorError::EmptySearch);
    }

    if records.is_empty() {
        return Err(LocatorError::RecordsNotLoaded);
    }

    let mut outcome = SearchOutcome::default();

    for code in split_codes(input) {
        match records.find_first(&code) {
            Some(apartment) => outcome.matched.push(apartment.clone()),
            None => {
                warn!("Appartement {} non trouvé dans les données", code);
                outcome.unmatched.push(code);
            }
        }
    }

    Ok(outcome)
}
