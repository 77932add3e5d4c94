//! Orb 动态数组
//!
//! 有序、拥有元素：
//! - push / set 时 retain 新元素
//! - pop / set 覆盖 / clear / 析构时 release 旧元素
//! - 越界访问返回 `None` / `false`，不报错
//!
//! 存储按摊还方式增长，`len()` 始终等于 push 成功次数减 pop 成功次数。

use std::cell::RefCell;

use crate::class::{ClassInfo, Construct, Instance};
use crate::error::{Result, RuntimeError};
use crate::hash::OaatHasher;
use crate::rc::{equals, hash_of, Object, OrbRc};

static ARRAY_CLASS: ClassInfo = ClassInfo::of::<OrbArray>("OrbArray");

/// Orb 数组
pub struct OrbArray {
    items: RefCell<Vec<Object>>,
}

impl Default for OrbArray {
    fn default() -> Self {
        Self::new()
    }
}

impl OrbArray {
    pub fn new() -> Self {
        OrbArray {
            items: RefCell::new(Vec::new()),
        }
    }

    /// 由元素列表构造并分配对象（元素的所有权转交给数组）
    pub fn create(items: Vec<Object>) -> Result<OrbRc<OrbArray>> {
        OrbRc::construct(items)
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 追加元素（retain 一次）
    pub fn push(&self, obj: &Object) -> Result<()> {
        let mut items = self.items.borrow_mut();
        items
            .try_reserve(1)
            .map_err(|_| RuntimeError::alloc::<Object>("array", items.len() + 1))?;
        items.push(obj.clone());
        Ok(())
    }

    /// 移除最后一个元素，把数组持有的那份引用交给调用方
    pub fn pop(&self) -> Option<Object> {
        self.items.borrow_mut().pop()
    }

    /// 按下标取元素（retain 一次返回）
    pub fn get(&self, index: usize) -> Option<Object> {
        self.items.borrow().get(index).cloned()
    }

    /// 覆盖已有下标；越界返回 false，数组不变
    pub fn set(&self, index: usize, obj: &Object) -> bool {
        let old = {
            let mut items = self.items.borrow_mut();
            match items.get_mut(index) {
                Some(slot) => std::mem::replace(slot, obj.clone()),
                None => return false,
            }
        };
        drop(old);
        true
    }

    pub fn last(&self) -> Option<Object> {
        self.items.borrow().last().cloned()
    }

    /// 按相等协议查找
    pub fn contains(&self, obj: &Object) -> bool {
        self.find(obj).is_some()
    }

    /// 按对象地址查找
    pub fn contains_ptr(&self, obj: &Object) -> bool {
        self.find_ptr(obj).is_some()
    }

    pub fn find(&self, obj: &Object) -> Option<usize> {
        self.items
            .borrow()
            .iter()
            .position(|item| equals(Some(item), Some(obj)))
    }

    pub fn find_ptr(&self, obj: &Object) -> Option<usize> {
        self.items
            .borrow()
            .iter()
            .position(|item| OrbRc::ptr_eq(item, obj))
    }

    /// 释放所有元素
    pub fn clear(&self) {
        let items = std::mem::take(&mut *self.items.borrow_mut());
        drop(items);
    }

    /// 元素快照（每个元素 retain 一次）
    pub fn to_vec(&self) -> Vec<Object> {
        self.items.borrow().clone()
    }

    pub fn iter(&self) -> OrbArrayIter<'_> {
        OrbArrayIter {
            array: self,
            pos: 0,
        }
    }
}

/// 数组游标
pub struct OrbArrayIter<'a> {
    array: &'a OrbArray,
    pos: usize,
}

impl Iterator for OrbArrayIter<'_> {
    type Item = Object;

    fn next(&mut self) -> Option<Object> {
        let item = self.array.get(self.pos)?;
        self.pos += 1;
        Some(item)
    }
}

impl Instance for OrbArray {
    fn class(&self) -> &'static ClassInfo {
        &ARRAY_CLASS
    }

    /// 长度相同且逐元素相等
    fn equal(&self, other: &Object) -> bool {
        let Some(other) = other.downcast_ref::<OrbArray>() else {
            return false;
        };
        let lhs = self.items.borrow();
        let rhs = other.items.borrow();
        lhs.len() == rhs.len()
            && lhs
                .iter()
                .zip(rhs.iter())
                .all(|(a, b)| equals(Some(a), Some(b)))
    }

    fn hash(&self) -> Option<u32> {
        let mut hasher = OaatHasher::new();
        for item in self.items.borrow().iter() {
            hasher.add_hash(hash_of(Some(item)));
        }
        Some(hasher.finish())
    }

    /// 浅复制：新数组 retain 每个元素
    fn copy(&self, _this: &Object) -> Result<Option<Object>> {
        let items = self.items.borrow();
        let mut copied = Vec::new();
        copied
            .try_reserve_exact(items.len())
            .map_err(|_| RuntimeError::alloc::<Object>("array", items.len()))?;
        copied.extend(items.iter().cloned());
        let copy = OrbArray {
            items: RefCell::new(copied),
        };
        Ok(Some(Object::from_instance(copy)?))
    }
}

impl Construct for OrbArray {
    type Args = Vec<Object>;

    fn construct(items: Vec<Object>) -> Result<Self> {
        Ok(OrbArray {
            items: RefCell::new(items),
        })
    }
}
