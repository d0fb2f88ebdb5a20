/// Number of digits kept: two-digit area code (DDD) plus a nine-digit subscriber number.
pub const MSISDN_LEN: usize = 11;

/// Reduce a free-form phone number to its trailing 11 digits.
///
/// Every non-digit is dropped first, so `"(85) 99999-1234"` and `"+55 85 99999 1234"`
/// both become `"85999991234"`. Shorter inputs are returned as-is; missing or empty
/// input yields an empty string.
pub fn normalize_msisdn(input: Option<&str>) -> String {
    let digits: Vec<char> = input
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let start = digits.len().saturating_sub(MSISDN_LEN);
    digits[start..].iter().collect()
}
