//! 区间：起点 + 长度

/// 连续区间，`length == usize::MAX` 表示一直延伸到末尾
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrbRange {
    pub start: usize,
    pub length: usize,
}

impl OrbRange {
    /// 覆盖全部元素
    pub const ALL: OrbRange = OrbRange {
        start: 0,
        length: usize::MAX,
    };

    pub const fn new(start: usize, length: usize) -> Self {
        OrbRange { start, length }
    }

    #[inline]
    pub fn is_to_end(&self) -> bool {
        self.length == usize::MAX
    }
}

impl Default for OrbRange {
    fn default() -> Self {
        Self::ALL
    }
}
