//! Amplitude Code Conversion
//!
//! The instrument sends each sample as an unsigned byte holding the
//! negated, doubled dBm value: `dBm = -(code) / 2`. A larger code is a
//! weaker signal.

/// Convert a native amplitude code to dBm (0.5 dB resolution)
pub fn to_dbm(code: u8) -> f64 {
    -(code as f64) / 2.0
}

/// Convert a native amplitude code to whole dBm
///
/// Lossy: the half-dB bit is truncated toward zero, so code 201
/// (-100.5 dBm) becomes -100. Use [`to_dbm`] where precision matters.
pub fn to_dbm_truncated(code: u8) -> i16 {
    -(code as i16) / 2
}

/// Convert dBm back to the nearest native code, saturating at 0 and 255
pub fn from_dbm(dbm: f64) -> u8 {
    (-dbm * 2.0).round().clamp(0.0, 255.0) as u8
}

/// Percentage of samples whose dBm value is at or below `threshold_dbm`
///
/// Returns 0.0 for an empty slice.
pub fn percent_at_or_below(codes: &[u8], threshold_dbm: f64) -> f64 {
    if codes.is_empty() {
        return 0.0;
    }
    let below = codes
        .iter()
        .filter(|&&code| to_dbm(code) <= threshold_dbm)
        .count();
    below as f64 * 100.0 / codes.len() as f64
}
