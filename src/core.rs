use std::hash::{Hash, Hasher};

/// Atomic reference-counted string type used for property names.
pub type ArcStr = std::sync::Arc<str>;

/// A 32-byte BLAKE3 hash used for content-addressing.
///
/// Pipelines are identified by a short prefix of this digest when they are
/// exported for debugging, so two pipelines with the same shape always get
/// the same identifier, no matter which process built them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

/// `std::hash::Hasher` backed by BLAKE3.
///
/// Unlike the randomly seeded `DefaultHasher`, the result is stable across
/// processes, which makes the structural hashes of property lists and alias
/// tables usable as persistent cache keys.
#[derive(Default)]
pub(crate) struct Blake3Hasher(blake3::Hasher);

impl Hasher for Blake3Hasher {
    fn finish(&self) -> u64 {
        let mut output = [0u8; 8];
        self.0.finalize_xof().fill(&mut output);
        u64::from_le_bytes(output)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
}

/// Hashes a single value with [`Blake3Hasher`].
pub(crate) fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = Blake3Hasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_one_is_stable() {
        assert_eq!(hash_one("position"), hash_one("position"));
        assert_ne!(hash_one("position"), hash_one("normal"));
    }

    #[test]
    fn test_hex() {
        let hex = Hash32::hash(b"abc").to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("6437b3ac"));
    }
}
