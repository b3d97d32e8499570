//! Simulated patient roster.

/// Default number of simulated patients.
pub const DEFAULT_PATIENT_COUNT: usize = 5;

/// Generates sequential patient identifiers (`patient_1`, `patient_2`, ...).
pub fn patient_ids(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("patient_{}", i)).collect()
}

/// Parses an explicit comma-separated roster, dropping blank entries.
pub fn parse_patient_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
