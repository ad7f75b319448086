//! Deterministic specification digests (versioned).
//!
//! Specification trees are used as keys while an optimizer searches and
//! de-duplicates candidate rewrites, and digests are written next to run
//! reports so two runs can be matched up. Both need a hash that is stable
//! across processes and platforms:
//!
//! - algorithm: **FNV-1a 64-bit**
//! - input: the structural hash stream of a `LinkSpecification`
//! - output: `"fnv1a64:<16 lowercase hex digits>"`
//!
//! This digest is **not** a security primitive.

use std::hash::Hasher;

use crate::link_spec::LinkSpecification;

/// Prefix used in serialized digests.
pub const SPEC_DIGEST_V1_PREFIX: &str = "fnv1a64:";

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

/// FNV-1a 64-bit as a `Hasher`.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a64 {
    hash: u64,
}

impl Fnv1a64 {
    pub fn new() -> Self {
        Self {
            hash: FNV_OFFSET_BASIS,
        }
    }
}

impl Default for Fnv1a64 {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Fnv1a64 {
    fn finish(&self) -> u64 {
        self.hash
    }

    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.hash ^= (*b) as u64;
            self.hash = self.hash.wrapping_mul(FNV_PRIME);
        }
    }

    // Fixed byte order so digests agree across platforms.
    fn write_u64(&mut self, i: u64) {
        self.write(&i.to_le_bytes());
    }
}

/// Compute a v1 digest (FNV-1a 64-bit) over arbitrary bytes.
pub fn fnv1a64_digest_bytes(bytes: &[u8]) -> String {
    let mut h = Fnv1a64::new();
    h.write(bytes);
    format!("{SPEC_DIGEST_V1_PREFIX}{:016x}", h.finish())
}

/// Compute the v1 digest of a specification.
///
/// Equal specifications (see `LinkSpecification`'s `PartialEq`) always share
/// a digest; it is derived from `structural_hash`.
pub fn spec_digest_v1(spec: &LinkSpecification) -> String {
    format!("{SPEC_DIGEST_V1_PREFIX}{:016x}", spec.structural_hash())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_has_expected_prefix_and_width() {
        let d = fnv1a64_digest_bytes(b"AND(a(x.p,y.p)|0.5, b(x.q,y.q)|0.6)");
        assert!(d.starts_with(SPEC_DIGEST_V1_PREFIX));
        assert_eq!(d.len(), SPEC_DIGEST_V1_PREFIX.len() + 16);
    }

    #[test]
    fn empty_input_hashes_to_offset_basis() {
        assert_eq!(fnv1a64_digest_bytes(b""), "fnv1a64:cbf29ce484222325");
    }

    #[test]
    fn equal_specs_share_a_digest() {
        let a = LinkSpecification::parse("OR(a(x.p,y.p)|0.5, b(x.q,y.q)|0.6)", 0.4).unwrap();
        let b = LinkSpecification::parse("OR(b(x.q,y.q)|0.6, A(x.p,y.p)|0.5)", 0.4).unwrap();
        assert_eq!(spec_digest_v1(&a), spec_digest_v1(&b));
    }

    #[test]
    fn digest_changes_with_operator() {
        let a = LinkSpecification::parse("OR(a(x.p,y.p)|0.5, b(x.q,y.q)|0.6)", 0.4).unwrap();
        let b = LinkSpecification::parse("AND(a(x.p,y.p)|0.5, b(x.q,y.q)|0.6)", 0.4).unwrap();
        assert_ne!(spec_digest_v1(&a), spec_digest_v1(&b));
    }
}
