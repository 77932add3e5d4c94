//! 引用池（自动释放栈）
//!
//! `RefPoolStack` 持有一串按推入顺序排列的池，`push()` 返回的 `RefPool`
//! 是作用域守卫，drop 时弹出该池：
//! - 先弹出在它之后推入的所有池（自顶向下）
//! - 再按登记顺序释放该池持有的每个对象
//!
//! 登记不会 retain：对象创建时的那一份引用转交给池。

use std::cell::{Cell, RefCell};

use crate::class::Construct;
use crate::error::{Result, RuntimeError};
use crate::rc::{Object, OrbRc};

struct PoolFrame {
    id: u64,
    objects: Vec<Object>,
}

/// 引用池栈
pub struct RefPoolStack {
    frames: RefCell<Vec<PoolFrame>>,
    next_id: Cell<u64>,
}

impl Default for RefPoolStack {
    fn default() -> Self {
        Self::new()
    }
}

impl RefPoolStack {
    pub fn new() -> Self {
        RefPoolStack {
            frames: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// 推入新池，成为当前栈顶
    pub fn push(&self) -> RefPool<'_> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let mut frames = self.frames.borrow_mut();
        frames.push(PoolFrame {
            id,
            objects: Vec::new(),
        });
        tracing::debug!(pool = id, depth = frames.len(), "ref pool pushed");

        RefPool { stack: self, id }
    }

    /// 当前存活的池数量
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// 是否有当前池
    pub fn has_current(&self) -> bool {
        self.depth() > 0
    }

    /// 把对象交给当前栈顶池
    ///
    /// 失败时 `obj` 随之释放，调用方不需要再做清理。
    pub fn autorelease(&self, obj: Object) -> Result<()> {
        let mut frames = self.frames.borrow_mut();
        let top = frames.last_mut().ok_or(RuntimeError::NoCurrentPool)?;
        track(top, obj)
    }

    /// 构造对象并登记到当前池；返回的句柄是额外的一次 retain
    pub fn create<T: Construct>(&self, args: T::Args) -> Result<OrbRc<T>> {
        let obj = OrbRc::<T>::construct(args)?;
        self.autorelease(obj.clone().into_object())?;
        Ok(obj)
    }

    fn register(&self, id: u64, obj: Object) -> Result<()> {
        let mut frames = self.frames.borrow_mut();
        let frame = frames
            .iter_mut()
            .find(|frame| frame.id == id)
            .ok_or(RuntimeError::StalePool)?;
        track(frame, obj)
    }

    fn tracked(&self, id: u64) -> usize {
        self.frames
            .borrow()
            .iter()
            .find(|frame| frame.id == id)
            .map_or(0, |frame| frame.objects.len())
    }

    fn is_top(&self, id: u64) -> bool {
        self.frames.borrow().last().is_some_and(|frame| frame.id == id)
    }

    fn drain(&self, id: u64) -> usize {
        let objects = {
            let mut frames = self.frames.borrow_mut();
            match frames.iter_mut().find(|frame| frame.id == id) {
                Some(frame) => std::mem::take(&mut frame.objects),
                None => return 0,
            }
        };
        // 释放时可能再次进入本栈，必须先归还借用
        let count = objects.len();
        drop(objects);
        count
    }

    fn pop(&self, id: u64) {
        let popped: Vec<PoolFrame> = {
            let mut frames = self.frames.borrow_mut();
            match frames.iter().position(|frame| frame.id == id) {
                Some(pos) => frames.drain(pos..).collect(),
                None => return,
            }
        };

        for frame in popped.into_iter().rev() {
            tracing::debug!(
                pool = frame.id,
                objects = frame.objects.len(),
                "ref pool popped"
            );
            for obj in frame.objects {
                obj.release();
            }
        }
    }
}

fn track(frame: &mut PoolFrame, obj: Object) -> Result<()> {
    frame
        .objects
        .try_reserve(1)
        .map_err(|_| RuntimeError::alloc::<Object>("ref pool", frame.objects.len() + 1))?;
    frame.objects.push(obj);
    Ok(())
}

/// 引用池守卫，drop 即弹出
pub struct RefPool<'s> {
    stack: &'s RefPoolStack,
    id: u64,
}

impl<'s> RefPool<'s> {
    /// 把对象登记到这个池（不一定是栈顶）
    pub fn register(&self, obj: Object) -> Result<()> {
        self.stack.register(self.id, obj)
    }

    /// 池中登记的对象数
    pub fn len(&self) -> usize {
        self.stack.tracked(self.id)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否为当前栈顶
    pub fn is_current(&self) -> bool {
        self.stack.is_top(self.id)
    }

    /// 立即释放已登记的对象，池本身保留；返回释放的数量
    pub fn drain(&self) -> usize {
        self.stack.drain(self.id)
    }
}

impl Drop for RefPool<'_> {
    fn drop(&mut self) {
        self.stack.pop(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassInfo, Instance};
    use std::rc::Rc;

    struct Counted {
        drops: Rc<Cell<u32>>,
    }

    static COUNTED_CLASS: ClassInfo = ClassInfo::of::<Counted>("Counted");

    impl Instance for Counted {
        fn class(&self) -> &'static ClassInfo {
            &COUNTED_CLASS
        }
    }

    impl Construct for Counted {
        type Args = Rc<Cell<u32>>;

        fn construct(drops: Rc<Cell<u32>>) -> Result<Self> {
            Ok(Counted { drops })
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn test_pool_releases_on_pop() {
        let stack = RefPoolStack::new();
        let drops = Rc::new(Cell::new(0));
        {
            let pool = stack.push();
            let obj = stack.create::<Counted>(drops.clone()).unwrap();
            assert_eq!(obj.ref_count(), 2);
            assert_eq!(pool.len(), 1);
            drop(obj);
            assert_eq!(drops.get(), 0);
        }
        assert_eq!(drops.get(), 1);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_no_current_pool() {
        let stack = RefPoolStack::new();
        let drops = Rc::new(Cell::new(0));
        let err = stack.create::<Counted>(drops.clone()).unwrap_err();
        assert!(matches!(err, RuntimeError::NoCurrentPool));
        // 失败路径上对象已被释放
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_popping_outer_pops_inner() {
        let stack = RefPoolStack::new();
        let drops = Rc::new(Cell::new(0));

        let outer = stack.push();
        let inner = stack.push();
        assert!(inner.is_current());
        assert!(!outer.is_current());

        let a = OrbRc::new(Counted { drops: drops.clone() }).unwrap();
        let b = OrbRc::new(Counted { drops: drops.clone() }).unwrap();
        outer.register(a.into_object()).unwrap();
        inner.register(b.into_object()).unwrap();

        drop(outer);
        assert_eq!(drops.get(), 2);
        assert_eq!(stack.depth(), 0);

        let err = inner
            .register(OrbRc::new(Counted { drops: drops.clone() }).unwrap().into_object())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::StalePool));
        assert_eq!(drops.get(), 3);

        // 已弹出的守卫再 drop 是空操作
        drop(inner);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_stale_guard_does_not_pop_newer_pool() {
        let stack = RefPoolStack::new();
        let outer = stack.push();
        let inner = stack.push();
        drop(outer);

        let fresh = stack.push();
        drop(inner);
        assert!(fresh.is_current());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_drain_keeps_pool() {
        let stack = RefPoolStack::new();
        let drops = Rc::new(Cell::new(0));
        let pool = stack.push();

        for _ in 0..3 {
            let obj = OrbRc::new(Counted { drops: drops.clone() }).unwrap();
            stack.autorelease(obj.into_object()).unwrap();
        }
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.drain(), 3);
        assert_eq!(drops.get(), 3);
        assert!(pool.is_empty());
        assert!(pool.is_current());
    }
}
