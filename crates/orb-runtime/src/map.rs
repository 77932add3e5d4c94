//! Orb 哈希表
//!
//! 开放寻址 + 线性探测 + 墓碑删除：
//! - 探测从 `hash & (capacity - 1)` 开始，先到表尾，再从 0 回绕到起点
//! - 墓碑对查找透明（跳过，不当作空槽），插入时可复用
//! - 负载 `items * 4 / capacity`：插入后 >= 3 翻倍，删除后 <= 1 减半
//! - 重建时把所有存活条目重新探测进新表，墓碑随之清除
//!
//! 键在插入时经 copy 协议复制一份，值被 retain。

use std::cell::RefCell;

use crate::class::{ClassInfo, Construct, Instance};
use crate::error::{Result, RuntimeError};
use crate::rc::{equals, hash_of, Object, OrbRc};
use crate::string::OrbString;

static MAP_CLASS: ClassInfo = ClassInfo::of::<OrbMap>("OrbMap");

struct Bucket {
    key: Object,
    value: Object,
    hash: u32,
}

enum Slot {
    Empty,
    Tombstone,
    Occupied(Bucket),
}

impl Slot {
    #[inline]
    fn is_free(&self) -> bool {
        !matches!(self, Slot::Occupied(_))
    }
}

/// 两段式探测顺序：`[start, cap)` 然后 `[0, start)`
#[inline]
fn probe_order(hash: u32, capacity: usize) -> impl Iterator<Item = usize> {
    let start = hash as usize & (capacity - 1);
    (start..capacity).chain(0..start)
}

struct Table {
    slots: Vec<Slot>,
    items: usize,
}

impl Table {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 查找键所在的槽；遇到空槽即停止
    fn find(&self, key: &Object, hash: u32) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        for i in probe_order(hash, self.capacity()) {
            match &self.slots[i] {
                Slot::Empty => return None,
                Slot::Tombstone => continue,
                Slot::Occupied(bucket) => {
                    if equals(Some(&bucket.key), Some(key)) {
                        return Some(i);
                    }
                }
            }
        }
        None
    }

    /// 插入位置：探测序列上第一个空槽或墓碑
    fn free_slot(slots: &[Slot], hash: u32) -> Option<usize> {
        probe_order(hash, slots.len()).find(|&i| slots[i].is_free())
    }

    fn allocate_slots(capacity: usize) -> Result<Vec<Slot>> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| RuntimeError::ResizeFailed { capacity })?;
        slots.resize_with(capacity, || Slot::Empty);
        Ok(slots)
    }

    #[inline]
    fn fullness(&self, items: usize) -> usize {
        items * 4 / self.capacity()
    }

    /// 插入前检查：放入 `items` 个条目后负载 >= 3 则翻倍
    fn grow_for(&mut self, items: usize) -> Result<()> {
        if self.fullness(items) >= 3 {
            self.rehash(self.capacity() << 1)
        } else {
            Ok(())
        }
    }

    /// 删除后检查：负载 <= 1 则减半，表最少保留一个槽
    fn shrink_for(&mut self, items: usize) -> Result<()> {
        if self.capacity() > 1 && self.fullness(items) <= 1 {
            self.rehash(self.capacity() >> 1)
        } else {
            Ok(())
        }
    }

    fn rehash(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity == 0 || new_capacity < self.items {
            tracing::warn!(capacity = new_capacity, items = self.items, "map resize rejected");
            return Err(RuntimeError::ResizeFailed {
                capacity: new_capacity,
            });
        }

        let mut slots = Self::allocate_slots(new_capacity)?;
        let old = std::mem::take(&mut self.slots);
        let old_capacity = old.len();

        for slot in old {
            if let Slot::Occupied(bucket) = slot {
                // 新容量不小于条目数，必然能找到空槽
                let Some(i) = Self::free_slot(&slots, bucket.hash) else {
                    return Err(RuntimeError::ResizeFailed {
                        capacity: new_capacity,
                    });
                };
                slots[i] = Slot::Occupied(bucket);
            }
        }

        self.slots = slots;
        tracing::debug!(
            from = old_capacity,
            to = new_capacity,
            items = self.items,
            "map resized"
        );
        Ok(())
    }
}

/// Orb 哈希表
pub struct OrbMap {
    table: RefCell<Table>,
}

impl Default for OrbMap {
    fn default() -> Self {
        Self::new()
    }
}

impl OrbMap {
    /// 创建空表（容量为 0，首次插入时分配）
    pub fn new() -> Self {
        OrbMap {
            table: RefCell::new(Table {
                slots: Vec::new(),
                items: 0,
            }),
        }
    }

    /// 条目数（不含墓碑）
    pub fn len(&self) -> usize {
        self.table.borrow().items
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 槽位总数
    pub fn capacity(&self) -> usize {
        self.table.borrow().capacity()
    }

    /// 获取值（retain 一次返回）
    pub fn get(&self, key: &Object) -> Option<Object> {
        let hash = key.hash_code();
        let table = self.table.borrow();
        let i = table.find(key, hash)?;
        match &table.slots[i] {
            Slot::Occupied(bucket) => Some(bucket.value.clone()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &Object) -> bool {
        let hash = key.hash_code();
        self.table.borrow().find(key, hash).is_some()
    }

    /// 设置键值对
    ///
    /// - `value` 非空且键不存在：插入（复制键、retain 值）
    /// - `value` 非空且键存在：替换值，键不变
    /// - `value` 为空：删除键（不存在时什么也不做）
    ///
    /// 键的 equal / copy 槽只在共享借用下或借用之外运行，
    /// 因此键可以读取本表（例如把表自身作为键）。
    pub fn set(&self, key: &Object, value: Option<&Object>) -> Result<()> {
        let hash = key.hash_code();
        let found = self.table.borrow().find(key, hash);

        match (found, value) {
            (None, None) => Ok(()),
            (None, Some(value)) => {
                let key = key.copy()?.ok_or(RuntimeError::CopyUnsupported {
                    class: key.class().name(),
                })?;
                let mut table = self.write()?;
                Self::insert(&mut table, key, value, hash)
            }
            (Some(i), Some(value)) => {
                let mut table = self.write()?;
                let displaced = match &mut table.slots[i] {
                    Slot::Occupied(bucket) => {
                        Some(std::mem::replace(&mut bucket.value, value.clone()))
                    }
                    _ => None,
                };
                // 被替换的值在归还借用之后才释放
                drop(table);
                drop(displaced);
                Ok(())
            }
            (Some(i), None) => {
                let mut table = self.write()?;
                let removed = match std::mem::replace(&mut table.slots[i], Slot::Tombstone) {
                    Slot::Occupied(bucket) => Some(bucket),
                    _ => None,
                };
                table.items -= 1;
                let items = table.items;
                let result = table.shrink_for(items);
                drop(table);
                drop(removed);
                result
            }
        }
    }

    fn write(&self) -> Result<std::cell::RefMut<'_, Table>> {
        self.table
            .try_borrow_mut()
            .map_err(|_| RuntimeError::BorrowConflict { what: "OrbMap" })
    }

    fn insert(table: &mut Table, key: Object, value: &Object, hash: u32) -> Result<()> {
        if table.slots.is_empty() {
            table.slots = Table::allocate_slots(1)?;
        }

        let items = table.items + 1;
        table.grow_for(items)?;

        let i = Table::free_slot(&table.slots, hash).ok_or(RuntimeError::ResizeFailed {
            capacity: table.capacity(),
        })?;

        table.slots[i] = Slot::Occupied(Bucket {
            key,
            value: value.clone(),
            hash,
        });
        table.items += 1;
        Ok(())
    }

    /// 删除键
    pub fn remove(&self, key: &Object) -> Result<()> {
        self.set(key, None)
    }

    /// 以字符串为键查找
    pub fn get_str(&self, key: &str) -> Result<Option<Object>> {
        let key = OrbString::object(key)?;
        Ok(self.get(&key))
    }

    /// 以字符串为键设置
    pub fn set_str(&self, key: &str, value: Option<&Object>) -> Result<()> {
        let key = OrbString::object(key)?;
        self.set(&key, value)
    }

    /// 顺序游标，跳过空槽和墓碑
    pub fn iter(&self) -> OrbMapIter<'_> {
        OrbMapIter { map: self, pos: 0 }
    }

    pub fn for_each(&self, mut f: impl FnMut(&Object, &Object)) {
        for (key, value) in self.iter() {
            f(&key, &value);
        }
    }

    /// 所有键（表内顺序）
    pub fn keys(&self) -> Vec<Object> {
        self.iter().map(|(key, _)| key).collect()
    }
}

/// 哈希表游标
///
/// 单次正向遍历；遍历期间修改表的结果未定义（但不会破坏内存安全）。
pub struct OrbMapIter<'a> {
    map: &'a OrbMap,
    pos: usize,
}

impl Iterator for OrbMapIter<'_> {
    type Item = (Object, Object);

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.map.table.borrow();
        while self.pos < table.capacity() {
            let i = self.pos;
            self.pos += 1;
            if let Slot::Occupied(bucket) = &table.slots[i] {
                return Some((bucket.key.clone(), bucket.value.clone()));
            }
        }
        None
    }
}

impl Instance for OrbMap {
    fn class(&self) -> &'static ClassInfo {
        &MAP_CLASS
    }

    /// 条目数相同，且本表每个键在对方表中取到相等的值
    fn equal(&self, other: &Object) -> bool {
        let Some(other) = other.downcast_ref::<OrbMap>() else {
            return false;
        };
        if self.len() != other.len() {
            return false;
        }
        self.iter()
            .all(|(key, value)| equals(other.get(&key).as_ref(), Some(&value)))
    }

    /// 与顺序无关：所有条目的键哈希与值哈希之和
    fn hash(&self) -> Option<u32> {
        let table = self.table.borrow();
        let mut hash = 0u32;
        for slot in &table.slots {
            if let Slot::Occupied(bucket) = slot {
                hash = hash.wrapping_add(bucket.hash);
                hash = hash.wrapping_add(hash_of(Some(&bucket.value)));
            }
        }
        Some(hash)
    }

    /// 浅复制：retain 键和值，保留槽位布局
    fn copy(&self, _this: &Object) -> Result<Option<Object>> {
        let table = self.table.borrow();
        let mut slots = Table::allocate_slots(table.capacity())?;
        for (dst, src) in slots.iter_mut().zip(table.slots.iter()) {
            if let Slot::Occupied(bucket) = src {
                *dst = Slot::Occupied(Bucket {
                    key: bucket.key.clone(),
                    value: bucket.value.clone(),
                    hash: bucket.hash,
                });
            }
        }
        let copy = OrbMap {
            table: RefCell::new(Table {
                slots,
                items: table.items,
            }),
        };
        Ok(Some(Object::from_instance(copy)?))
    }
}

impl Construct for OrbMap {
    type Args = Vec<(Object, Object)>;

    fn construct(pairs: Self::Args) -> Result<Self> {
        let map = OrbMap::new();
        for (key, value) in &pairs {
            map.set(key, Some(value))?;
        }
        Ok(map)
    }
}

impl OrbMap {
    /// 由键值对构造并分配对象
    pub fn create(pairs: Vec<(Object, Object)>) -> Result<OrbRc<OrbMap>> {
        OrbRc::construct(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OrbInt;

    fn s(text: &str) -> Object {
        OrbString::object(text).unwrap()
    }

    fn int(value: i64) -> Object {
        OrbInt::object(value).unwrap()
    }

    fn int_of(obj: &Object) -> i64 {
        obj.downcast_ref::<OrbInt>().unwrap().value()
    }

    fn tombstones(map: &OrbMap) -> usize {
        map.table
            .borrow()
            .slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Tombstone))
            .count()
    }

    #[test]
    fn test_map_basic() {
        let map = OrbMap::new();
        map.set(&s("a"), Some(&int(1))).unwrap();
        map.set(&s("b"), Some(&int(2))).unwrap();
        map.set(&s("a"), Some(&int(3))).unwrap();

        assert_eq!(int_of(&map.get(&s("a")).unwrap()), 3);
        assert_eq!(int_of(&map.get(&s("b")).unwrap()), 2);
        assert_eq!(map.len(), 2);
        assert!(map.get(&s("zzz")).is_none());
    }

    #[test]
    fn test_growth_keeps_keys() {
        let map = OrbMap::new();
        assert_eq!(map.capacity(), 0);
        for i in 0..4 {
            map.set(&int(i), Some(&int(i * 10))).unwrap();
        }
        assert!(map.capacity() >= 4);
        assert!(map.capacity().is_power_of_two());
        for i in 0..4 {
            assert_eq!(int_of(&map.get(&int(i)).unwrap()), i * 10);
        }
    }

    #[test]
    fn test_load_factor_after_insert() {
        let map = OrbMap::new();
        for i in 0..100 {
            map.set(&int(i), Some(&int(i))).unwrap();
            assert!(map.len() * 4 / map.capacity() < 3);
            assert!(map.capacity().is_power_of_two());
        }
        assert_eq!(map.len(), 100);
    }

    #[test]
    fn test_delete_and_shrink() {
        let map = OrbMap::new();
        for i in 0..32 {
            map.set(&int(i), Some(&int(i))).unwrap();
        }
        let grown = map.capacity();
        for i in 0..30 {
            map.remove(&int(i)).unwrap();
            assert!(map.get(&int(i)).is_none());
        }
        assert_eq!(map.len(), 2);
        assert!(map.capacity() < grown);
        assert!(map.capacity().is_power_of_two());
        assert_eq!(int_of(&map.get(&int(30)).unwrap()), 30);
        assert_eq!(int_of(&map.get(&int(31)).unwrap()), 31);

        map.remove(&int(30)).unwrap();
        map.remove(&int(31)).unwrap();
        assert!(map.is_empty());
        assert!(map.capacity() >= 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let map = OrbMap::new();
        map.remove(&s("nope")).unwrap();
        map.set(&s("x"), Some(&int(1))).unwrap();
        map.remove(&s("nope")).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_tombstone_is_transparent() {
        // 容量 8 时 0、8 冲突于同一起点
        let map = OrbMap::new();
        for i in [0, 8, 16, 1, 2] {
            map.set(&int(i), Some(&int(i))).unwrap();
        }
        assert_eq!(map.capacity(), 8);

        map.remove(&int(0)).unwrap();
        assert_eq!(tombstones(&map), 1);
        assert_eq!(int_of(&map.get(&int(8)).unwrap()), 8);
        assert_eq!(int_of(&map.get(&int(16)).unwrap()), 16);

        // 插入复用墓碑
        map.set(&int(24), Some(&int(24))).unwrap();
        assert_eq!(tombstones(&map), 0);
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn test_idempotent_set() {
        let map = OrbMap::new();
        let value = int(7);
        map.set(&s("k"), Some(&value)).unwrap();
        map.set(&s("k"), Some(&value)).unwrap();
        assert_eq!(map.len(), 1);
        // 表内持有一份
        assert_eq!(value.ref_count(), 2);
    }

    #[test]
    fn test_key_is_copied_value_is_retained() {
        let map = OrbMap::new();
        let key = OrbString::object("key").unwrap();
        let value = int(1);
        map.set(&key, Some(&value)).unwrap();

        assert_eq!(key.ref_count(), 1);
        assert_eq!(value.ref_count(), 2);

        // 修改原键不影响表内的副本
        key.downcast_ref::<OrbString>().unwrap().set("changed").unwrap();
        assert!(map.get_str("key").unwrap().is_some());

        map.remove(&s("key")).unwrap();
        assert_eq!(value.ref_count(), 1);
    }

    #[test]
    fn test_uncopyable_key() {
        use crate::boxed::OrbBox;
        let map = OrbMap::new();
        let key = Object::from_instance(OrbBox::new(5u8, 0)).unwrap();
        let err = map.set(&key, Some(&int(1))).unwrap_err();
        assert!(matches!(err, RuntimeError::CopyUnsupported { .. }));
        assert!(map.is_empty());
    }

    #[test]
    fn test_iteration() {
        let map = OrbMap::create(vec![(s("a"), int(1)), (s("b"), int(2)), (s("c"), int(3))]).unwrap();
        map.remove(&s("b")).unwrap();

        let mut total = 0;
        let mut count = 0;
        map.for_each(|_, value| {
            total += int_of(value);
            count += 1;
        });
        assert_eq!(count, 2);
        assert_eq!(total, 4);

        let mut iter = map.iter();
        iter.next();
        iter.next();
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_map_equal_hash_copy() {
        let a = OrbMap::create(vec![(s("x"), int(1)), (s("y"), int(2))]).unwrap().into_object();
        let b = OrbMap::create(vec![(s("y"), int(2)), (s("x"), int(1))]).unwrap().into_object();
        let c = OrbMap::create(vec![(s("x"), int(1)), (s("y"), int(3))]).unwrap().into_object();

        assert!(a.equals(&b));
        assert_eq!(a.hash_code(), b.hash_code());
        assert!(!a.equals(&c));
        assert!(!a.equals(&int(1)));

        let copy = a.copy().unwrap().unwrap();
        assert!(!OrbRc::ptr_eq(&copy, &a));
        assert!(copy.equals(&a));
        let copy_map = copy.downcast_ref::<OrbMap>().unwrap();
        assert_eq!(copy_map.len(), 2);
        assert_eq!(int_of(&copy_map.get(&s("y")).unwrap()), 2);
    }

    #[test]
    fn test_string_key_helpers() {
        let map = OrbMap::new();
        map.set_str("alpha", Some(&int(9))).unwrap();
        assert_eq!(int_of(&map.get_str("alpha").unwrap().unwrap()), 9);
        map.set_str("alpha", None).unwrap();
        assert!(map.get_str("alpha").unwrap().is_none());
    }

    #[test]
    fn test_drop_releases_entries() {
        let value = int(5);
        {
            let map = OrbMap::new();
            map.set(&s("k"), Some(&value)).unwrap();
            assert_eq!(value.ref_count(), 2);
        }
        assert_eq!(value.ref_count(), 1);
    }

    #[test]
    fn test_map_as_own_key() {
        let m = OrbMap::create(vec![]).unwrap().into_object();
        let map = m.downcast_ref::<OrbMap>().unwrap();
        map.set(&s("x"), Some(&int(1))).unwrap();

        // 键的 hash / equal / copy 都会读取这张表
        map.set(&m, Some(&int(2))).unwrap();
        assert_eq!(map.len(), 2);

        // 存入的是当时的快照副本
        let snapshot = map
            .keys()
            .into_iter()
            .find(|key| key.is::<OrbMap>())
            .unwrap();
        assert!(!OrbRc::ptr_eq(&snapshot, &m));
        let snapshot = snapshot.downcast_ref::<OrbMap>().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(int_of(&snapshot.get_str("x").unwrap().unwrap()), 1);
    }

    #[test]
    fn test_set_while_borrowed_is_error() {
        let map = OrbMap::new();
        map.set(&s("a"), Some(&int(1))).unwrap();

        let guard = map.table.borrow();
        let err = map.set(&s("b"), Some(&int(2))).unwrap_err();
        assert!(matches!(err, RuntimeError::BorrowConflict { .. }));
        let err = map.remove(&s("a")).unwrap_err();
        assert!(matches!(err, RuntimeError::BorrowConflict { .. }));
        drop(guard);

        assert_eq!(map.len(), 1);
        map.set(&s("b"), Some(&int(2))).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_rehash_rejects_bad_capacity() {
        let map = OrbMap::new();
        for i in 0..4 {
            map.set(&int(i), Some(&int(i))).unwrap();
        }
        let capacity = map.capacity();

        let err = map.table.borrow_mut().rehash(0).unwrap_err();
        assert!(matches!(err, RuntimeError::ResizeFailed { capacity: 0 }));
        let err = map.table.borrow_mut().rehash(3).unwrap_err();
        assert!(matches!(err, RuntimeError::ResizeFailed { capacity: 3 }));

        // 失败的重建不改动原表
        assert_eq!(map.capacity(), capacity);
        assert_eq!(map.len(), 4);
        for i in 0..4 {
            assert_eq!(int_of(&map.get(&int(i)).unwrap()), i);
        }
    }
}
