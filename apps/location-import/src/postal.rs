//! Reading postal directory CSVs into (state, district) name pairs.

use std::io::Read;

use crate::error::ImportError;

const STATE_HEADERS: &[&str] = &["statename", "state_name", "state"];
const DISTRICT_HEADERS: &[&str] = &["district", "districtname", "district_name"];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedFile {
    /// Normalized pairs in file order, duplicates included.
    pub rows: Vec<(String, String)>,
    /// Rows missing a state or district value.
    pub skipped: usize,
}

/// Trims, collapses inner whitespace and title-cases each word.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h.trim().eq_ignore_ascii_case(c)))
}

pub fn parse_locations<R: Read>(reader: R) -> Result<ParsedFile, ImportError> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv.headers()?.clone();
    let state_col = find_column(&headers, STATE_HEADERS).ok_or(ImportError::MissingColumn("state"))?;
    let district_col =
        find_column(&headers, DISTRICT_HEADERS).ok_or(ImportError::MissingColumn("district"))?;

    let mut parsed = ParsedFile::default();
    for record in csv.records() {
        let record = record?;
        let state = record.get(state_col).map(normalize_name).unwrap_or_default();
        let district = record.get(district_col).map(normalize_name).unwrap_or_default();
        if state.is_empty() || district.is_empty() {
            parsed.skipped += 1;
            continue;
        }
        parsed.rows.push((state, district));
    }
    Ok(parsed)
}
