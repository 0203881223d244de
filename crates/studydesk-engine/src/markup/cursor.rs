/// A byte cursor over markup source.
///
/// All structural characters the tokenizer cares about (`<`, `>`, `/`, `=`,
/// quotes, whitespace) are ASCII, so advancing byte-wise never splits a
/// multi-byte character as long as callers only stop on those bytes.
#[derive(Clone)]
pub struct Cursor<'a> {
    /// The source being tokenized.
    pub s: &'a str,
    /// Current byte index into `s`.
    pub i: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    pub fn pos(&self) -> usize {
        self.i
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    /// Peeks at the current byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.i).copied()
    }

    /// Peeks `n` bytes ahead of the current position.
    pub fn peek_at(&self, n: usize) -> Option<u8> {
        self.s.as_bytes().get(self.i + n).copied()
    }

    pub fn starts_with(&self, pat: &[u8]) -> bool {
        self.s.as_bytes()[self.i.min(self.s.len())..].starts_with(pat)
    }

    /// ASCII case-insensitive variant of [`Cursor::starts_with`].
    pub fn starts_with_ignore_case(&self, pat: &[u8]) -> bool {
        let rest = &self.s.as_bytes()[self.i.min(self.s.len())..];
        rest.len() >= pat.len() && rest[..pat.len()].eq_ignore_ascii_case(pat)
    }

    pub fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.i += 1;
        Some(b)
    }

    pub fn bump_n(&mut self, n: usize) {
        self.i = (self.i + n).min(self.s.len());
    }

    /// Consumes bytes while `pred` holds and returns the consumed slice.
    pub fn eat_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.i;
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.i += 1;
        }
        &self.s[start..self.i]
    }

    pub fn skip_whitespace(&mut self) {
        self.eat_while(|b| b.is_ascii_whitespace());
    }

    /// Advances past the next occurrence of `pat`, or to end of input when
    /// the pattern never occurs. Returns the text skipped over, excluding
    /// the pattern itself.
    pub fn skip_past(&mut self, pat: &str) -> &'a str {
        let rest = &self.s[self.i..];
        match rest.find(pat) {
            Some(found) => {
                let skipped = &rest[..found];
                self.i += found + pat.len();
                skipped
            }
            None => {
                self.i = self.s.len();
                rest
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_basics() {
        let mut cur = Cursor::new("<p>");
        assert_eq!(cur.pos(), 0);
        assert!(!cur.eof());
        assert_eq!(cur.peek(), Some(b'<'));
        assert_eq!(cur.peek_at(1), Some(b'p'));
        assert_eq!(cur.bump(), Some(b'<'));
        assert_eq!(cur.pos(), 1);
    }

    #[test]
    fn starts_with_ignore_case_matches_mixed_case() {
        let cur = Cursor::new("</SCRIPT>");
        assert!(cur.starts_with_ignore_case(b"</script"));
        assert!(!cur.starts_with(b"</script"));
    }

    #[test]
    fn eat_while_returns_consumed_slice() {
        let mut cur = Cursor::new("strong class=x");
        let name = cur.eat_while(|b| b.is_ascii_alphanumeric());
        assert_eq!(name, "strong");
        assert_eq!(cur.peek(), Some(b' '));
    }

    #[test]
    fn skip_past_consumes_through_pattern() {
        let mut cur = Cursor::new("<!-- note -->after");
        cur.bump_n(4);
        assert_eq!(cur.skip_past("-->"), " note ");
        assert_eq!(&cur.s[cur.pos()..], "after");
    }

    #[test]
    fn skip_past_missing_pattern_runs_to_end() {
        let mut cur = Cursor::new("<!-- never closed");
        cur.bump_n(4);
        cur.skip_past("-->");
        assert!(cur.eof());
    }

    #[test]
    fn bump_at_eof_returns_none() {
        let mut cur = Cursor::new("x");
        assert_eq!(cur.bump(), Some(b'x'));
        assert_eq!(cur.bump(), None);
        assert_eq!(cur.bump(), None);
    }

    #[test]
    fn bump_n_clamps_to_end() {
        let mut cur = Cursor::new("hi");
        cur.bump_n(10);
        assert!(cur.eof());
        assert_eq!(cur.peek(), None);
        assert!(cur.starts_with(b""));
    }
}
