//! 32-bit tenant identifier.

use std::fmt;

/// A 32-bit tenant identifier.
///
/// Buckets are disjoint keyspaces: every row in [`crate::table::LocalKv`] is named
/// `bucket.hex() || k1`, so two buckets never share a row prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bucket(u32);

impl Bucket {
    pub const fn from_u32(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Parses a bucket id from a hex literal of the form `0x...`.
    pub fn from_hex_literal(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
        u32::from_str_radix(digits, 16).ok().map(Self)
    }

    /// Derives a bucket id from a tenant name via a stable djb2-variant hash.
    pub fn from_name(name: &str) -> Self {
        Self(djb2_hash(name.as_bytes()))
    }

    /// Lowercase 8-hex-digit form, used as the row-name prefix in [`crate::table::LocalKv`].
    pub fn hex(self) -> String {
        format!("{:08x}", self.0)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

/// djb2, seeded with the 4 big-endian bytes of the running hash prepended ahead of the
/// string bytes so short tenant names still mix well.
fn djb2_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &b in &hash.to_be_bytes() {
        hash = hash.wrapping_mul(33) ^ u32::from(b);
    }
    for &b in bytes {
        hash = hash.wrapping_mul(33) ^ u32::from(b);
    }
    hash
}

/// Stable 32-bit hash used both for [`Bucket::from_name`] and for the IOM registry's
/// `iom_hash` values (see [`crate::iom::registry::IomRegistry`]).
pub fn stable_hash(name: &str) -> u32 {
    djb2_hash(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips_through_from_u32() {
        let b = Bucket::from_u32(0xdead_beef);
        assert_eq!(b.hex(), "deadbeef");
    }

    #[test]
    fn from_hex_literal_parses() {
        assert_eq!(Bucket::from_hex_literal("0x1234abcd"), Some(Bucket::from_u32(0x1234abcd)));
        assert_eq!(Bucket::from_hex_literal("not-hex"), None);
    }

    #[test]
    fn from_name_is_stable() {
        let a = Bucket::from_name("my_bucket2");
        let b = Bucket::from_name("my_bucket2");
        assert_eq!(a, b);
        assert_ne!(a, Bucket::from_name("something_else"));
    }
}
