/// Truncate a string to at most `max_bytes` without splitting a UTF-8 character.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Collapse whitespace runs into single spaces and cap the length, marking
/// the cut with an ellipsis.
pub fn excerpt(s: &str, max_bytes: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= max_bytes {
        return flat;
    }
    format!("{}…", truncate_to_char_boundary(&flat, max_bytes).trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_multibyte_characters() {
        let s = "naïve";
        assert_eq!(truncate_to_char_boundary(s, 3), "na");
        assert_eq!(truncate_to_char_boundary(s, 4), "naï");
        assert_eq!(truncate_to_char_boundary(s, 64), "naïve");
    }

    #[test]
    fn excerpt_flattens_and_marks_cut() {
        assert_eq!(excerpt("a  b\n\nc", 10), "a b c");
        assert_eq!(excerpt("alpha beta gamma", 10), "alpha beta…");
    }
}
