// Apartment records - published sheet CSV → ordered records
// Two columns (reference, address), header row first, no quoted fields

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One row of the published sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApartmentRecord {
    pub reference: String,
    pub address: String,
}

impl ApartmentRecord {
    pub fn new(reference: impl Into<String>, address: impl Into<String>) -> Self {
        ApartmentRecord {
            reference: reference.into(),
            address: address.into(),
        }
    }

    /// Case-insensitive comparison against an already upper-cased code
    pub fn matches(&self, upper_code: &str) -> bool {
        self.reference.to_uppercase() == upper_code
    }

    /// Popup text shown when the apartment's marker is opened
    pub fn info(&self) -> String {
        format!("{}\n{}", self.reference, self.address)
    }
}

/// Parse the sheet CSV into records.
///
/// Line 0 is the header and is always skipped. Blank lines are skipped.
/// Fields are split on every comma: a comma inside an address shifts the
/// columns, quoting is not understood. Rows whose reference or address is
/// missing or empty after trimming are dropped. Never fails.
pub fn parse_csv(csv_text: &str) -> Vec<ApartmentRecord> {
    let body = match csv_text.split_once('\n') {
        Some((_header, rest)) => rest,
        None => return Vec::new(),
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for result in rdr.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                debug!("Skipping unreadable CSV row: {}", e);
                dropped += 1;
                continue;
            }
        };

        let reference = row.get(0).map(str::trim).unwrap_or("");
        let address = row.get(1).map(str::trim).unwrap_or("");

        if reference.is_empty() || address.is_empty() {
            dropped += 1;
            continue;
        }

        records.push(ApartmentRecord::new(reference, address));
    }

    debug!("Parsed {} records ({} rows dropped)", records.len(), dropped);
    records
}

/// The record set of the latest successful load.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<ApartmentRecord>,
    loaded_at: Option<DateTime<Utc>>,
}

impl RecordSet {
    pub fn new(records: Vec<ApartmentRecord>) -> Self {
        RecordSet {
            records,
            loaded_at: Some(Utc::now()),
        }
    }

    pub fn from_csv(csv_text: &str) -> Self {
        Self::new(parse_csv(csv_text))
    }

    pub fn records(&self) -> &[ApartmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// First record whose reference equals `code`, ignoring case and
    /// surrounding whitespace. Duplicated references resolve to the
    /// earliest row.
    pub fn find_first(&self, code: &str) -> Option<&ApartmentRecord> {
        let upper = code.trim().to_uppercase();
        self.records.iter().find(|apt| apt.matches(&upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_header_and_empty_rows() {
        let csv = "ref,addr\nA1B205,12 Rue X\n,\nA0B123,5 Rue Y\n";
        let records = parse_csv(csv);

        assert_eq!(
            records,
            vec![
                ApartmentRecord::new("A1B205", "12 Rue X"),
                ApartmentRecord::new("A0B123", "5 Rue Y"),
            ]
        );
    }

    #[test]
    fn test_parse_trims_fields_and_crlf() {
        let csv = "Reference,Adresse\r\n  A1B47 ,  3 Rue d'Antibes  \r\n";
        let records = parse_csv(csv);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reference, "A1B47");
        assert_eq!(records[0].address, "3 Rue d'Antibes");
    }

    #[test]
    fn test_parse_skips_blank_and_single_column_lines() {
        let csv = "ref,addr\n\n   \nA1B1\nA1B2,\nA1B3,1 Rue Z\n";
        let records = parse_csv(csv);

        assert_eq!(records, vec![ApartmentRecord::new("A1B3", "1 Rue Z")]);
    }

    #[test]
    fn test_parse_comma_in_address_shifts_columns() {
        // Quoting is not supported: the address is cut at the first comma
        let csv = "ref,addr\nA1B9,\"4, Rue Y\"\n";
        let records = parse_csv(csv);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, "\"4");
    }

    #[test]
    fn test_parse_header_only_or_empty_input() {
        assert!(parse_csv("").is_empty());
        assert!(parse_csv("ref,addr").is_empty());
        assert!(parse_csv("ref,addr\n").is_empty());
    }

    #[test]
    fn test_parse_header_is_skipped_even_if_it_looks_like_data() {
        let records = parse_csv("A1B1,1 Rue A\nA1B2,2 Rue B");
        assert_eq!(records, vec![ApartmentRecord::new("A1B2", "2 Rue B")]);
    }

    #[test]
    fn test_find_first_is_case_insensitive() {
        let set = RecordSet::from_csv("ref,addr\nA1B205,12 Rue X\n");

        assert_eq!(set.find_first("a1b205").map(|r| r.address.as_str()), Some("12 Rue X"));
        assert_eq!(set.find_first("  A1b205 ").map(|r| r.address.as_str()), Some("12 Rue X"));
        assert!(set.find_first("A1B206").is_none());
    }

    #[test]
    fn test_find_first_prefers_earliest_duplicate() {
        let set = RecordSet::from_csv("ref,addr\nA1B1,First\na1b1,Second\n");
        assert_eq!(set.find_first("A1B1").map(|r| r.address.as_str()), Some("First"));
    }

    #[test]
    fn test_record_set_tracks_load_time() {
        assert!(RecordSet::default().loaded_at().is_none());
        assert!(RecordSet::new(vec![]).loaded_at().is_some());
    }
}
