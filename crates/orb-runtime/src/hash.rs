//! One-at-a-time 哈希
//!
//! 字符串、数组、Bag、位向量的哈希都经过这里。

/// Jenkins one-at-a-time 累加器，初始值为 0
#[derive(Debug, Clone, Copy, Default)]
pub struct OaatHasher {
    state: u32,
}

impl OaatHasher {
    #[inline]
    pub fn new() -> Self {
        OaatHasher { state: 0 }
    }

    /// 混入一个字节
    #[inline]
    pub fn add(&mut self, byte: u8) {
        let mut h = self.state;
        h = h.wrapping_add(byte as u32);
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
        self.state = h;
    }

    /// 按大端字节顺序混入另一个哈希值
    #[inline]
    pub fn add_hash(&mut self, other: u32) {
        for byte in other.to_be_bytes() {
            self.add(byte);
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.add(b);
        }
    }

    #[inline]
    pub fn finish(self) -> u32 {
        let mut h = self.state;
        h = h.wrapping_add(h << 3);
        h ^= h >> 11;
        h = h.wrapping_add(h << 15);
        h
    }
}

/// 便捷函数：对字节串求哈希
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hasher = OaatHasher::new();
    hasher.add_bytes(bytes);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(OaatHasher::new().finish(), 0);
        assert_eq!(hash_bytes(b""), 0);
    }

    #[test]
    fn test_add_hash_matches_bytes() {
        let mut a = OaatHasher::new();
        a.add_hash(0x0102_0304);
        let mut b = OaatHasher::new();
        b.add_bytes(&[1, 2, 3, 4]);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(hash_bytes(b"ab"), hash_bytes(b"ba"));
    }
}
