/// True when `prefix` is empty, equal to `data`, or a leading part of it.
pub fn is_prefix(prefix: &[u8], data: &[u8]) -> bool {
    data.starts_with(prefix)
}

/// True when either sequence is a prefix of the other.
pub fn prefix_match(a: &[u8], b: &[u8]) -> bool {
    is_prefix(a, b) || is_prefix(b, a)
}
