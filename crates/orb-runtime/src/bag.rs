//! Orb Bag：无序、可增长的对象集合
//!
//! 与 OrbArray 的区别：
//! - 容量可以大于元素数，空间用尽时按 `old * 3 / 2 + 1` 增长
//! - 删除是 O(1)：被删位置由最后一个元素填补，顺序不保留
//! - `add` / `set` 直接接管调用方交出的那份引用，不额外 retain；
//!   `remove*` / `clear` 把引用交还调用方
//!
//! `set` 可以越过当前元素数写入，中间留下空位（`get` 返回 `None`）。

use std::cell::RefCell;

use crate::class::{ClassInfo, Construct, Instance};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::hash::OaatHasher;
use crate::rc::{equals, hash_of, Object, OrbRc};

static BAG_CLASS: ClassInfo = ClassInfo::of::<OrbBag>("OrbBag");

struct BagInner {
    /// 长度始终等于容量
    slots: Vec<Option<Object>>,
    size: usize,
}

impl BagInner {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 扩容到 `capacity`；0 表示按默认比例增长，不会缩小
    fn grow(&mut self, capacity: usize) -> Result<()> {
        let capacity = if capacity == 0 {
            self.capacity() * 3 / 2 + 1
        } else {
            capacity
        };
        if capacity <= self.capacity() {
            return Ok(());
        }

        self.slots
            .try_reserve_exact(capacity - self.capacity())
            .map_err(|_| RuntimeError::alloc::<Object>("bag", capacity))?;
        tracing::trace!(from = self.capacity(), to = capacity, "bag grown");
        self.slots.resize_with(capacity, || None);
        Ok(())
    }

    fn ensure_capacity(&mut self, index: usize) -> Result<()> {
        if index >= self.capacity() {
            self.grow(index.saturating_mul(2).max(index + 1))
        } else {
            Ok(())
        }
    }

    /// 取出 `index` 处元素，用最后一个元素填补
    fn remove_at(&mut self, index: usize) -> Option<Object> {
        if index >= self.size {
            return None;
        }
        let removed = self.slots[index].take();
        self.size -= 1;
        self.slots.swap(index, self.size);
        removed
    }

    fn position(&self, obj: &Object) -> Option<usize> {
        self.slots[..self.size]
            .iter()
            .position(|slot| equals(Some(obj), slot.as_ref()))
    }
}

/// Orb Bag
pub struct OrbBag {
    inner: RefCell<BagInner>,
}

impl OrbBag {
    /// 使用配置的默认容量
    pub fn new() -> Result<Self> {
        Self::with_capacity(0)
    }

    /// `capacity` 为 0 时使用 `RuntimeConfig::bag_capacity`
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let capacity = if capacity == 0 {
            RuntimeConfig::global().bag_capacity
        } else {
            capacity
        };
        let mut inner = BagInner {
            slots: Vec::new(),
            size: 0,
        };
        inner.grow(capacity)?;
        Ok(OrbBag {
            inner: RefCell::new(inner),
        })
    }

    /// 分配对象
    pub fn create(capacity: usize) -> Result<OrbRc<OrbBag>> {
        OrbRc::construct(capacity)
    }

    /// 元素数
    pub fn len(&self) -> usize {
        self.inner.borrow().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity()
    }

    pub fn is_index_within_bounds(&self, index: usize) -> bool {
        index < self.capacity()
    }

    /// 追加到末尾，接管 `obj`
    pub fn add(&self, obj: Object) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.size == inner.capacity() {
            inner.grow(0)?;
        }
        let i = inner.size;
        inner.slots[i] = Some(obj);
        inner.size += 1;
        Ok(())
    }

    /// 按下标读取（retain 一次返回）；超出容量或空位返回 `None`
    pub fn get(&self, index: usize) -> Option<Object> {
        self.inner.borrow().slots.get(index).cloned().flatten()
    }

    /// 同 `get`，但超出容量时先把容量扩到 `index * 7 / 4 + 1`
    pub fn safe_get(&self, index: usize) -> Result<Option<Object>> {
        let mut inner = self.inner.borrow_mut();
        if index >= inner.capacity() {
            inner.grow(index.saturating_mul(7) / 4 + 1)?;
            return Ok(None);
        }
        Ok(inner.slots[index].clone())
    }

    /// 写入 `index`，必要时扩容到 `index * 2`；返回被覆盖的元素
    pub fn set(&self, index: usize, obj: Object) -> Result<Option<Object>> {
        let mut inner = self.inner.borrow_mut();
        inner.ensure_capacity(index)?;
        let old = inner.slots[index].replace(obj);
        inner.size = inner.size.max(index + 1);
        Ok(old)
    }

    pub fn grow(&self, capacity: usize) -> Result<()> {
        self.inner.borrow_mut().grow(capacity)
    }

    pub fn ensure_capacity(&self, index: usize) -> Result<()> {
        self.inner.borrow_mut().ensure_capacity(index)
    }

    /// 移除 `index` 处元素，最后一个元素移到该位置
    ///
    /// `index` 处是 `set` 留下的空洞时同样会缩短并搬移末尾元素，但返回 `None`；
    /// 与越界的区别可先用 `index < len()` 判断。
    pub fn remove_at(&self, index: usize) -> Option<Object> {
        self.inner.borrow_mut().remove_at(index)
    }

    /// 移除第一个与 `obj` 相等的元素
    pub fn remove(&self, obj: &Object) -> Option<Object> {
        let mut inner = self.inner.borrow_mut();
        let i = inner.position(obj)?;
        inner.remove_at(i)
    }

    /// 移除末尾元素；末尾是空洞时缩短一格并返回 `None`
    pub fn remove_last(&self) -> Option<Object> {
        let mut inner = self.inner.borrow_mut();
        if inner.size == 0 {
            return None;
        }
        inner.size -= 1;
        let i = inner.size;
        inner.slots[i].take()
    }

    /// 对 `other` 的每个元素移除本 Bag 中第一个相等的元素，返回被移除的元素
    pub fn remove_all(&self, other: &OrbBag) -> Vec<Object> {
        let wanted = other.to_vec();
        let mut inner = self.inner.borrow_mut();
        let mut removed = Vec::new();
        for obj in &wanted {
            if let Some(i) = inner.position(obj) {
                removed.extend(inner.remove_at(i));
            }
        }
        removed
    }

    pub fn contains(&self, obj: &Object) -> bool {
        self.inner.borrow().position(obj).is_some()
    }

    /// 清空，所有元素交还调用方
    pub fn clear(&self) -> Vec<Object> {
        let mut inner = self.inner.borrow_mut();
        let size = inner.size;
        inner.size = 0;
        inner.slots[..size].iter_mut().filter_map(Option::take).collect()
    }

    /// 追加 `other` 的全部元素（每个 retain 一次）
    pub fn add_all(&self, other: &OrbBag) -> Result<()> {
        for obj in other.to_vec() {
            self.add(obj)?;
        }
        Ok(())
    }

    /// 前 `len()` 个位置上的元素快照，跳过空位
    pub fn to_vec(&self) -> Vec<Object> {
        let inner = self.inner.borrow();
        inner.slots[..inner.size].iter().flatten().cloned().collect()
    }
}

impl Instance for OrbBag {
    fn class(&self) -> &'static ClassInfo {
        &BAG_CLASS
    }

    /// 元素数相同且逐位置相等（空位只与空位相等）
    fn equal(&self, other: &Object) -> bool {
        let Some(other) = other.downcast_ref::<OrbBag>() else {
            return false;
        };
        let lhs = self.inner.borrow();
        let rhs = other.inner.borrow();
        lhs.size == rhs.size
            && lhs.slots[..lhs.size]
                .iter()
                .zip(rhs.slots[..rhs.size].iter())
                .all(|(a, b)| equals(a.as_ref(), b.as_ref()))
    }

    fn hash(&self) -> Option<u32> {
        let inner = self.inner.borrow();
        let mut hasher = OaatHasher::new();
        for slot in &inner.slots[..inner.size] {
            hasher.add_hash(hash_of(slot.as_ref()));
        }
        Some(hasher.finish())
    }

    /// 浅复制：容量相同，retain 每个元素
    fn copy(&self, _this: &Object) -> Result<Option<Object>> {
        let inner = self.inner.borrow();
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(inner.capacity())
            .map_err(|_| RuntimeError::alloc::<Object>("bag", inner.capacity()))?;
        slots.extend(inner.slots.iter().cloned());
        let copy = OrbBag {
            inner: RefCell::new(BagInner {
                slots,
                size: inner.size,
            }),
        };
        Ok(Some(Object::from_instance(copy)?))
    }
}

impl Construct for OrbBag {
    type Args = usize;

    fn construct(capacity: usize) -> Result<Self> {
        OrbBag::with_capacity(capacity)
    }
}
