use std::cmp::Ordering;
use std::fmt;

/// Three-valued comparison over serialized keys.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Orders keys by the signed 64-bit little-endian integer in their first
/// eight bytes.
pub struct Int64Comparator;

impl KeyComparator for Int64Comparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        if a.len() < 8 || b.len() < 8 {
            return a.len().cmp(&b.len());
        }

        let a_val = i64::from_le_bytes(a[..8].try_into().unwrap());
        let b_val = i64::from_le_bytes(b[..8].try_into().unwrap());

        a_val.cmp(&b_val)
    }
}

/// Orders keys as opaque byte strings.
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Fixed-width index key of `N` bytes.
///
/// Integer keys are packed little-endian into the low bytes, mirroring
/// how `Int64Comparator` reads them back; the remaining bytes stay zero.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn new(data: [u8; N]) -> Self {
        Self { data }
    }

    pub fn from_i64(value: i64) -> Self {
        let mut data = [0u8; N];
        let bytes = value.to_le_bytes();
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    /// Reconstructs a key from a stored slice of exactly `N` bytes.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&bytes[..N]);
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0u8; N] }
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey{:?}", &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int64_comparator_orders_numerically() {
        let cmp = Int64Comparator;
        let a = GenericKey::<8>::from_i64(3);
        let b = GenericKey::<8>::from_i64(200);

        assert_eq!(cmp.compare(a.as_bytes(), b.as_bytes()), Ordering::Less);
        assert_eq!(cmp.compare(b.as_bytes(), a.as_bytes()), Ordering::Greater);
        assert_eq!(cmp.compare(a.as_bytes(), a.as_bytes()), Ordering::Equal);
    }

    #[test]
    fn test_int64_comparator_negative_keys() {
        let cmp = Int64Comparator;
        let neg = GenericKey::<8>::from_i64(-5);
        let pos = GenericKey::<8>::from_i64(5);

        assert_eq!(cmp.compare(neg.as_bytes(), pos.as_bytes()), Ordering::Less);
    }

    #[test]
    fn test_bytewise_comparator() {
        let cmp = BytewiseComparator;
        assert_eq!(cmp.compare(b"abc", b"abd"), Ordering::Less);
        assert_eq!(cmp.compare(b"abc", b"abc"), Ordering::Equal);
    }

    #[test]
    fn test_generic_key_round_trip() {
        let key = GenericKey::<16>::from_i64(42);
        let restored = GenericKey::<16>::from_slice(key.as_bytes());
        assert_eq!(key, restored);
    }
}
