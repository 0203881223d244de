//! Offset conversions.
//!
//! Surface offsets count UTF-16 code units; block text is stored as UTF-8.
//! Every conversion here snaps to a character boundary, so an offset that
//! lands inside a surrogate pair or a multi-byte sequence rounds down.

/// Length of `s` in UTF-16 code units.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Byte index of the character containing UTF-16 offset `offset`, clamped to
/// the end of `s`.
pub fn utf16_to_byte(s: &str, offset: usize) -> usize {
    let mut units = 0;
    for (byte, ch) in s.char_indices() {
        let next = units + ch.len_utf16();
        if next > offset {
            return byte;
        }
        units = next;
    }
    s.len()
}

/// UTF-16 offset of byte index `byte`, rounding down to a character start.
pub fn byte_to_utf16(s: &str, byte: usize) -> usize {
    let mut units = 0;
    for (index, ch) in s.char_indices() {
        if index >= byte {
            break;
        }
        if index + ch.len_utf8() > byte {
            break;
        }
        units += ch.len_utf16();
    }
    units
}

/// UTF-16 offset of the character start before `offset`, or 0.
pub fn prev_boundary(s: &str, offset: usize) -> usize {
    let byte = utf16_to_byte(s, offset);
    match s[..byte].chars().next_back() {
        Some(ch) => byte_to_utf16(s, byte - ch.len_utf8()),
        None => 0,
    }
}

/// UTF-16 offset just past the character at `offset`, clamped to the end.
pub fn next_boundary(s: &str, offset: usize) -> usize {
    let byte = utf16_to_byte(s, offset);
    match s[byte..].chars().next() {
        Some(ch) => byte_to_utf16(s, byte + ch.len_utf8()),
        None => utf16_len(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", 0)]
    #[case("abc", 3)]
    #[case("é", 1)]
    #[case("世界", 2)]
    #[case("🦀", 2)]
    fn test_utf16_len(#[case] s: &str, #[case] expected: usize) {
        assert_eq!(utf16_len(s), expected);
    }

    #[test]
    fn test_utf16_to_byte_across_widths() {
        let s = "aé🦀b";
        assert_eq!(utf16_to_byte(s, 0), 0);
        assert_eq!(utf16_to_byte(s, 1), 1);
        assert_eq!(utf16_to_byte(s, 2), 3);
        // inside the surrogate pair snaps to the crab
        assert_eq!(utf16_to_byte(s, 3), 3);
        assert_eq!(utf16_to_byte(s, 4), 7);
        assert_eq!(utf16_to_byte(s, 5), 8);
        assert_eq!(utf16_to_byte(s, 99), 8);
    }

    #[test]
    fn test_byte_to_utf16_rounds_down() {
        let s = "aé🦀b";
        assert_eq!(byte_to_utf16(s, 0), 0);
        assert_eq!(byte_to_utf16(s, 1), 1);
        assert_eq!(byte_to_utf16(s, 2), 1);
        assert_eq!(byte_to_utf16(s, 3), 2);
        assert_eq!(byte_to_utf16(s, 7), 4);
        assert_eq!(byte_to_utf16(s, 8), 5);
    }

    #[test]
    fn test_boundaries_step_over_whole_characters() {
        let s = "a🦀b";
        assert_eq!(next_boundary(s, 1), 3);
        assert_eq!(prev_boundary(s, 3), 1);
        assert_eq!(prev_boundary(s, 0), 0);
        assert_eq!(next_boundary(s, 4), 4);
    }
}
