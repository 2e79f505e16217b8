//! Row/column key pairs and their canonical packed ("pup") form.

use std::fmt;

/// A `(K1, K2)` pair. K1 is the row, K2 is the column. Either component may end in a
/// single trailing `*` to request prefix matching on that component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    k1: String,
    k2: String,
}

impl Key {
    pub fn new(k1: impl Into<String>, k2: impl Into<String>) -> Self {
        Self {
            k1: k1.into(),
            k2: k2.into(),
        }
    }

    /// A row-only key, using the empty-column fast path (`col_single`).
    pub fn row(k1: impl Into<String>) -> Self {
        Self::new(k1, String::new())
    }

    pub fn k1(&self) -> &str {
        &self.k1
    }

    pub fn k2(&self) -> &str {
        &self.k2
    }

    /// K1 must be non-empty for a key to be usable in `put`/`get`/`want`.
    pub fn is_valid(&self) -> bool {
        !self.k1.is_empty()
    }

    pub fn is_row_wildcard(&self) -> bool {
        self.k1.ends_with('*')
    }

    pub fn is_col_wildcard(&self) -> bool {
        self.k2.ends_with('*')
    }

    /// The literal prefix of K1 with a trailing wildcard stripped, if any.
    pub fn row_prefix(&self) -> &str {
        self.k1.strip_suffix('*').unwrap_or(&self.k1)
    }

    /// The literal prefix of K2 with a trailing wildcard stripped, if any.
    pub fn col_prefix(&self) -> &str {
        self.k2.strip_suffix('*').unwrap_or(&self.k2)
    }

    /// True if `candidate_k1`/`candidate_k2` match this key's patterns, honoring
    /// wildcard-suffix semantics on either component independently.
    pub fn matches(&self, candidate_k1: &str, candidate_k2: &str) -> bool {
        matches_prefix_string(self.is_row_wildcard(), self.row_prefix(), candidate_k1)
            && matches_prefix_string(self.is_col_wildcard(), self.col_prefix(), candidate_k2)
    }

    /// The canonical packed byte form of this key: a reversible injection of `(K1, K2)`
    /// into a single string, safe to embed as one path component once further escaped
    /// by [`make_punycode`].
    pub fn pup(&self) -> String {
        format!("{}\u{1}{}", escape_pup_component(&self.k1), escape_pup_component(&self.k2))
    }

    /// Inverse of [`Key::pup`].
    pub fn from_pup(encoded: &str) -> Option<Self> {
        let mut parts = encoded.splitn(2, '\u{1}');
        let k1 = unescape_pup_component(parts.next()?);
        let k2 = unescape_pup_component(parts.next()?);
        Some(Self::new(k1, k2))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.k1, self.k2)
    }
}

/// `w` selects prefix matching (the pattern ends in `*`); `pattern` is the literal
/// prefix with the `*` already stripped.
pub fn matches_prefix_string(w: bool, pattern: &str, candidate: &str) -> bool {
    if w {
        candidate.starts_with(pattern)
    } else {
        candidate == pattern
    }
}

/// Internal separator escape: `pup()` joins K1 and K2 with an unescaped `\u{1}`, so any
/// literal occurrence in a component must itself be escaped first.
fn escape_pup_component(s: &str) -> String {
    s.replace('\u{1}', "\u{1}\u{1}")
}

fn unescape_pup_component(s: &str) -> String {
    s.replace("\u{1}\u{1}", "\u{1}")
}

/// Turns a byte string into a filesystem-safe form by percent-escaping (`%HH`) every
/// byte that isn't `[A-Za-z0-9._-]`.
pub fn make_punycode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Inverse of [`make_punycode`].
pub fn expand_punycode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(v) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pup_round_trips() {
        let k = Key::new("mybigitem", "7");
        let encoded = k.pup();
        assert_eq!(Key::from_pup(&encoded), Some(k));
    }

    #[test]
    fn pup_round_trips_with_embedded_separator_byte() {
        let k = Key::new("weird\u{1}row", "col");
        assert_eq!(Key::from_pup(&k.pup()), Some(k));
    }

    #[test]
    fn punycode_round_trips_every_byte_string() {
        for s in ["plain", "has space", "Something_1", "slash/and:colon", ""] {
            assert_eq!(expand_punycode(&make_punycode(s)), s);
        }
    }

    #[test]
    fn wildcard_matching() {
        let k = Key::new("Something_1", "Other_2");
        assert!(k.matches("Something_1", "Other_2"));
        assert!(!k.matches("Something_1", "Other_3"));

        let w = Key::new("Something_*", "Other_X*");
        assert!(w.is_row_wildcard());
        assert!(w.matches("Something_1", "Other_X9"));
        assert!(!w.matches("SomethingElse", "Other_X9"));
    }

    #[test]
    fn validity() {
        assert!(Key::new("row", "col").is_valid());
        assert!(!Key::new("", "col").is_valid());
    }
}
