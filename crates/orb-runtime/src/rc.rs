//! 引用计数对象
//!
//! Orb 的每个堆对象前面都有一个对象头：
//! - 类描述符：决定 equal / hash / copy 的分派
//! - 强引用计数：创建时为 1，retain +1，release -1，归零时析构并释放
//!
//! 单线程、非原子计数，不做循环检测。
//!
//! 内存布局:
//! ```text
//! +----------------------+
//! | class: &ClassInfo    |  8 bytes
//! +----------------------+
//! | ref_count: u32       |  4 bytes
//! +----------------------+
//! | value...             |  实际数据
//! +----------------------+
//! ```

use std::alloc::{alloc, dealloc, Layout};
use std::any::type_name;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use crate::class::{ClassInfo, Construct, Instance};
use crate::error::{Result, RuntimeError};

/// 对象头，位于每个负载之前
#[repr(C)]
pub struct ObjectHeader {
    class: &'static ClassInfo,
    ref_count: Cell<u32>,
}

impl ObjectHeader {
    #[inline]
    fn new(class: &'static ClassInfo) -> Self {
        ObjectHeader {
            class,
            ref_count: Cell::new(1),
        }
    }

    /// 增加引用计数；溢出时直接中止进程
    #[inline]
    fn inc(&self) {
        let count = self.ref_count.get();
        debug_assert!(count > 0, "retain on released object");
        match count.checked_add(1) {
            Some(next) => self.ref_count.set(next),
            None => {
                tracing::error!(class = self.class.name(), "reference count overflow");
                std::process::abort();
            }
        }
    }

    /// 减少引用计数，返回是否应该释放
    #[inline]
    fn dec(&self) -> bool {
        let count = self.ref_count.get();
        debug_assert!(count > 0, "release underflow");
        self.ref_count.set(count - 1);
        count == 1
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.get()
    }

    #[inline]
    pub fn class(&self) -> &'static ClassInfo {
        self.class
    }
}

/// 内部存储结构
#[repr(C)]
struct RcBox<T: ?Sized> {
    header: ObjectHeader,
    value: T,
}

/// 带引用计数的对象句柄（强引用）
///
/// `Clone` 即 retain，`Drop` 即 release。
pub struct OrbRc<T: ?Sized + 'static> {
    ptr: NonNull<RcBox<T>>,
    _marker: PhantomData<RcBox<T>>,
}

/// 类型擦除后的对象句柄
pub type Object = OrbRc<dyn Instance>;

impl<T: Instance> OrbRc<T> {
    /// 分配对象并写入负载（ref_count = 1）
    pub fn new(value: T) -> Result<Self> {
        let ptr = Self::allocate()?;
        Ok(unsafe { Self::init(ptr, value) })
    }

    /// 先分配存储，再运行构造函数；构造失败时释放存储
    pub fn construct(args: T::Args) -> Result<Self>
    where
        T: Construct,
    {
        let ptr = Self::allocate()?;
        match T::construct(args) {
            Ok(value) => Ok(unsafe { Self::init(ptr, value) }),
            Err(source) => {
                unsafe { dealloc(ptr.as_ptr() as *mut u8, Layout::new::<RcBox<T>>()) };
                tracing::debug!(class = type_name::<T>(), error = %source, "constructor failed");
                Err(RuntimeError::ConstructionFailed {
                    class: type_name::<T>(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// 向上转型为类型擦除的 `Object`，不改变引用计数
    pub fn into_object(self) -> Object {
        let this = ManuallyDrop::new(self);
        let ptr: NonNull<RcBox<dyn Instance>> = this.ptr;
        OrbRc {
            ptr,
            _marker: PhantomData,
        }
    }

    fn allocate() -> Result<NonNull<RcBox<T>>> {
        // RcBox 至少包含对象头，大小不为零
        let layout = Layout::new::<RcBox<T>>();
        let raw = unsafe { alloc(layout) } as *mut RcBox<T>;
        NonNull::new(raw).ok_or(RuntimeError::AllocationFailed {
            what: type_name::<T>(),
            size: layout.size(),
        })
    }

    /// # Safety
    /// `ptr` 必须来自 `allocate()` 且尚未初始化
    unsafe fn init(ptr: NonNull<RcBox<T>>, value: T) -> Self {
        let class = value.class();
        ptr.as_ptr().write(RcBox {
            header: ObjectHeader::new(class),
            value,
        });
        tracing::trace!(class = class.name(), "object allocated");
        OrbRc {
            ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + 'static> OrbRc<T> {
    #[inline]
    fn header(&self) -> &ObjectHeader {
        unsafe { &(*self.ptr.as_ptr()).header }
    }

    /// 获取引用计数
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.header().ref_count()
    }

    /// 获取类描述符
    #[inline]
    pub fn class(&self) -> &'static ClassInfo {
        self.header().class()
    }

    /// 对象是否属于给定类
    #[inline]
    pub fn is_a(&self, class: &ClassInfo) -> bool {
        self.class().same(class)
    }

    /// 增加引用计数，返回新句柄
    #[inline]
    pub fn retain(&self) -> Self {
        self.clone()
    }

    /// 减少引用计数，归零时析构
    #[inline]
    pub fn release(self) {
        drop(self)
    }

    /// 对象地址（对象头起始位置）
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as *const u8 as usize
    }

    /// 是否指向同一个对象
    #[inline]
    pub fn ptr_eq<U: ?Sized + 'static>(this: &Self, other: &OrbRc<U>) -> bool {
        this.addr() == other.addr()
    }
}

impl OrbRc<dyn Instance> {
    /// 分配对象并直接擦除类型
    pub fn from_instance<T: Instance>(value: T) -> Result<Object> {
        Ok(OrbRc::new(value)?.into_object())
    }

    /// 负载是否为类型 `T`
    #[inline]
    pub fn is<T: Instance>(&self) -> bool {
        (**self).as_any().is::<T>()
    }

    /// 借用具体类型的负载
    #[inline]
    pub fn downcast_ref<T: Instance>(&self) -> Option<&T> {
        (**self).as_any().downcast_ref::<T>()
    }

    /// 取得具体类型的句柄（retain 一次）
    pub fn downcast<T: Instance>(&self) -> Option<OrbRc<T>> {
        if !self.is::<T>() {
            return None;
        }
        self.header().inc();
        Some(OrbRc {
            ptr: self.ptr.cast::<RcBox<T>>(),
            _marker: PhantomData,
        })
    }

    /// 按类的相等槽比较
    #[inline]
    pub fn equals(&self, other: &Object) -> bool {
        equals(Some(self), Some(other))
    }

    /// 按类的哈希槽求哈希
    #[inline]
    pub fn hash_code(&self) -> u32 {
        hash_of(Some(self))
    }

    /// 按类的复制槽复制；`Ok(None)` 表示不支持复制
    #[inline]
    pub fn copy(&self) -> Result<Option<Object>> {
        copy_of(Some(self))
    }
}

impl<T: ?Sized + 'static> Clone for OrbRc<T> {
    fn clone(&self) -> Self {
        self.header().inc();
        OrbRc {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + 'static> Drop for OrbRc<T> {
    fn drop(&mut self) {
        if self.header().dec() {
            unsafe {
                let layout = Layout::for_value(self.ptr.as_ref());
                let class = self.class().name();
                // 先析构负载（可能级联释放子对象），再释放整块内存
                ptr::drop_in_place(self.ptr.as_ptr());
                dealloc(self.ptr.as_ptr() as *mut u8, layout);
                tracing::trace!(class, "object freed");
            }
        }
    }
}

impl<T: ?Sized + 'static> Deref for OrbRc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &(*self.ptr.as_ptr()).value }
    }
}

impl<T: ?Sized + 'static> fmt::Debug for OrbRc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrbRc")
            .field("class", &self.class().name())
            .field("ref_count", &self.ref_count())
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

impl<T: Instance> From<OrbRc<T>> for Object {
    fn from(rc: OrbRc<T>) -> Self {
        rc.into_object()
    }
}

// ==================== 分派 ====================

/// 相等：同一对象（含双空）为真；一方为空为假；否则交给类的相等槽
pub fn equals(a: Option<&Object>, b: Option<&Object>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => OrbRc::ptr_eq(a, b) || Instance::equal(&**a, b),
        _ => false,
    }
}

/// 哈希：空对象为 0；类未提供哈希槽时取地址的低 32 位
pub fn hash_of(obj: Option<&Object>) -> u32 {
    match obj {
        None => 0,
        Some(obj) => Instance::hash(&**obj).unwrap_or(obj.addr() as u32),
    }
}

/// 复制：空对象或类不支持复制时返回 `Ok(None)`
pub fn copy_of(obj: Option<&Object>) -> Result<Option<Object>> {
    match obj {
        None => Ok(None),
        Some(obj) => Instance::copy(&**obj, obj),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    impl Drop for Counted {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    struct Failing;

    static FAILING_CLASS: ClassInfo = ClassInfo::of::<Failing>("Failing");

    impl Instance for Failing {
        fn class(&self) -> &'static ClassInfo {
            &FAILING_CLASS
        }
    }

    impl Construct for Failing {
        type Args = bool;

        fn construct(ok: bool) -> Result<Self> {
            if ok {
                Ok(Failing)
            } else {
                Err(RuntimeError::AllocationFailed { what: "test", size: 0 })
            }
        }
    }

    fn counted() -> (OrbRc<Counted>, Rc<Cell<u32>>) {
        let drops = Rc::new(Cell::new(0));
        let rc = OrbRc::new(Counted { drops: drops.clone() }).unwrap();
        (rc, drops)
    }

    #[test]
    fn test_rc_basic() {
        let (rc1, drops) = counted();
        assert_eq!(rc1.ref_count(), 1);

        let rc2 = rc1.retain();
        assert_eq!(rc1.ref_count(), 2);
        assert!(OrbRc::ptr_eq(&rc1, &rc2));

        rc2.release();
        assert_eq!(rc1.ref_count(), 1);
        assert_eq!(drops.get(), 0);

        rc1.release();
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_retain_twice_release_three_times() {
        let (rc, drops) = counted();
        let a = rc.retain();
        let b = rc.retain();

        a.release();
        assert_eq!(drops.get(), 0);
        b.release();
        assert_eq!(drops.get(), 0);
        rc.release();
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_construct_failure() {
        let err = OrbRc::<Failing>::construct(false).unwrap_err();
        assert!(matches!(err, RuntimeError::ConstructionFailed { .. }));

        let ok = OrbRc::<Failing>::construct(true).unwrap();
        assert_eq!(ok.ref_count(), 1);
        assert!(ok.is_a(&FAILING_CLASS));
    }

    #[test]
    fn test_object_downcast() {
        let (rc, drops) = counted();
        let obj = rc.into_object();
        assert!(obj.is::<Counted>());
        assert!(!obj.is::<Failing>());
        assert!(obj.downcast_ref::<Failing>().is_none());

        let typed = obj.downcast::<Counted>().unwrap();
        assert_eq!(obj.ref_count(), 2);
        assert_eq!(typed.class().name(), "Counted");

        drop(typed);
        drop(obj);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_default_slots() {
        let (a, _) = counted();
        let (b, _) = counted();
        let a = a.into_object();
        let b = b.into_object();

        assert!(equals(Some(&a), Some(&a)));
        assert!(!equals(Some(&a), Some(&b)));
        assert!(!equals(Some(&a), None));
        assert!(equals(None, None));

        assert_eq!(hash_of(None), 0);
        assert_eq!(a.hash_code(), a.addr() as u32);
        assert!(a.copy().unwrap().is_none());
        assert!(copy_of(None).unwrap().is_none());
    }

    #[test]
    fn test_retain_up_to_max_count() {
        let (rc, drops) = counted();
        rc.header().ref_count.set(u32::MAX - 1);

        let extra = rc.retain();
        assert_eq!(rc.ref_count(), u32::MAX);
        extra.release();
        assert_eq!(rc.ref_count(), u32::MAX - 1);
        assert_eq!(drops.get(), 0);

        rc.header().ref_count.set(1);
        rc.release();
        assert_eq!(drops.get(), 1);
    }
}
