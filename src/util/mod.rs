use md5::{Digest, Md5};

pub type FHashMap<K, V> = fnv::FnvHashMap<K, V>;
pub type FHashSet<T> = fnv::FnvHashSet<T>;
pub type UHashMap<T> = FHashMap<usize, T>;

/// MD5 digest of a key, as the integer used for all ring arithmetic.
/// Big-endian, so numeric order matches lexicographic order of the
/// hex rendering.
pub fn md5_hash(key: &str) -> u128 {
    let mut ctx = Md5::new();
    ctx.update(key.as_bytes());
    let digest = ctx.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    u128::from_be_bytes(bytes)
}

pub fn hash_to_id(hash: u128) -> String {
    format!("{:032X}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_enc() {
        let hash = 0x0123_4567_89AB_CDEF_0123_4567_89AB_CDEFu128;
        let s = hash_to_id(hash);
        assert_eq!(s.len(), 32);
        assert_eq!(u128::from_str_radix(&s, 16).unwrap(), hash);
    }

    #[test]
    fn test_md5_known_digest() {
        // md5("hello") = 5D41402ABC4B2A76B9719D911017C592
        let h = md5_hash("hello");
        assert_eq!(hash_to_id(h), "5D41402ABC4B2A76B9719D911017C592");
    }
}
