//! Orb 位向量
//!
//! 以 32 位字存储，下标超出当前字数时自动扩容（至少翻倍）。
//! 相等与哈希只看置位的集合，末尾全零的字不参与比较。

use std::cell::RefCell;
use std::fmt;

use crate::class::{ClassInfo, Construct, Instance};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::hash::OaatHasher;
use crate::rc::{Object, OrbRc};

static BITVECTOR_CLASS: ClassInfo = ClassInfo::of::<OrbBitVector>("OrbBitVector");

const ADDRESS_BITS_PER_WORD: usize = 5;
const BITS_PER_WORD: usize = 1 << ADDRESS_BITS_PER_WORD;

#[inline]
fn word_index(bit: usize) -> usize {
    bit >> ADDRESS_BITS_PER_WORD
}

#[inline]
fn bit_mask(bit: usize) -> u32 {
    1u32 << (bit & (BITS_PER_WORD - 1))
}

/// 去掉末尾全零的字
fn significant(words: &[u32]) -> &[u32] {
    let end = words.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
    &words[..end]
}

/// Orb 位向量
pub struct OrbBitVector {
    words: RefCell<Vec<u32>>,
}

impl OrbBitVector {
    /// 至少容纳 `nbits` 位；0 位时不分配
    pub fn new(nbits: usize) -> Result<Self> {
        let count = if nbits == 0 { 0 } else { word_index(nbits - 1) + 1 };
        Ok(OrbBitVector {
            words: RefCell::new(zeroed(count)?),
        })
    }

    /// 使用 `RuntimeConfig::bitvector_bits` 作为初始位数
    pub fn with_default_bits() -> Result<Self> {
        Self::new(RuntimeConfig::global().bitvector_bits)
    }

    /// 分配对象
    pub fn create(nbits: usize) -> Result<OrbRc<OrbBitVector>> {
        OrbRc::construct(nbits)
    }

    /// 当前可寻址的位数
    pub fn size(&self) -> usize {
        self.words.borrow().len() << ADDRESS_BITS_PER_WORD
    }

    /// 没有任何置位
    pub fn is_empty(&self) -> bool {
        self.words.borrow().iter().all(|&w| w == 0)
    }

    pub fn set(&self, bit: usize, value: bool) -> Result<()> {
        let index = word_index(bit);
        let mut words = self.words.borrow_mut();
        if index >= words.len() {
            let wanted = (words.len() * 2).max(index + 1);
            let extra = wanted - words.len();
            words
                .try_reserve_exact(extra)
                .map_err(|_| RuntimeError::alloc::<u32>("bit vector", wanted))?;
            words.resize(wanted, 0);
        }
        if value {
            words[index] |= bit_mask(bit);
        } else {
            words[index] &= !bit_mask(bit);
        }
        Ok(())
    }

    pub fn get(&self, bit: usize) -> bool {
        self.words
            .borrow()
            .get(word_index(bit))
            .is_some_and(|&w| w & bit_mask(bit) != 0)
    }

    /// 清除一位；超出范围的位本来就是 0
    pub fn clear(&self, bit: usize) {
        if let Some(word) = self.words.borrow_mut().get_mut(word_index(bit)) {
            *word &= !bit_mask(bit);
        }
    }

    pub fn clear_all(&self) {
        self.words.borrow_mut().fill(0);
    }

    /// 从 `from`（含）开始的第一个置位
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let words = self.words.borrow();
        let mut u = word_index(from);
        let mut word = *words.get(u)? & (u32::MAX << (from & (BITS_PER_WORD - 1)));
        loop {
            if word != 0 {
                return Some(u * BITS_PER_WORD + word.trailing_zeros() as usize);
            }
            u += 1;
            word = *words.get(u)?;
        }
    }

    /// 两个位向量是否有共同置位
    pub fn intersects(&self, other: &OrbBitVector) -> bool {
        let lhs = self.words.borrow();
        let rhs = other.words.borrow();
        lhs.iter().zip(rhs.iter()).any(|(a, b)| a & b != 0)
    }

    /// 所有置位的下标（升序）
    pub fn ones(&self) -> Vec<usize> {
        let mut bits = Vec::new();
        let mut next = self.next_set_bit(0);
        while let Some(bit) = next {
            bits.push(bit);
            next = self.next_set_bit(bit + 1);
        }
        bits
    }
}

fn zeroed(count: usize) -> Result<Vec<u32>> {
    let mut words = Vec::new();
    words
        .try_reserve_exact(count)
        .map_err(|_| RuntimeError::alloc::<u32>("bit vector", count))?;
    words.resize(count, 0);
    Ok(words)
}

impl Instance for OrbBitVector {
    fn class(&self) -> &'static ClassInfo {
        &BITVECTOR_CLASS
    }

    fn equal(&self, other: &Object) -> bool {
        let Some(other) = other.downcast_ref::<OrbBitVector>() else {
            return false;
        };
        let lhs = self.words.borrow();
        let rhs = other.words.borrow();
        significant(&lhs) == significant(&rhs)
    }

    fn hash(&self) -> Option<u32> {
        let words = self.words.borrow();
        let mut hasher = OaatHasher::new();
        for &word in significant(&words) {
            hasher.add_hash(word);
        }
        Some(hasher.finish())
    }

    /// 深复制
    fn copy(&self, _this: &Object) -> Result<Option<Object>> {
        let words = self.words.borrow();
        let mut copied = zeroed(words.len())?;
        copied.copy_from_slice(&words);
        let copy = OrbBitVector {
            words: RefCell::new(copied),
        };
        Ok(Some(Object::from_instance(copy)?))
    }
}

impl Construct for OrbBitVector {
    type Args = usize;

    fn construct(nbits: usize) -> Result<Self> {
        OrbBitVector::new(nbits)
    }
}

impl fmt::Debug for OrbBitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = self.words.borrow();
        let mut list = f.debug_list();
        for word in words.iter() {
            list.entry(&format_args!("{:#010x}", word));
        }
        list.finish()
    }
}
