/// Split a comma-separated list as typed into a form field.
///
/// Items are trimmed and empty items dropped; order is preserved.
pub fn split_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
