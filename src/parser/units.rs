/// Digits of `value` read as a unit count; 0 when there are none.
/// Counts beyond `u32::MAX` saturate.
pub fn normalize_units(value: Option<&str>) -> u32 {
    let digits: String = value
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(u32::MAX)
}
