//! 类描述符与实例协议
//!
//! 每个具体类型有且只有一个 `static ClassInfo`；相等、哈希、复制通过
//! `Instance` trait 动态分派，析构由负载类型自身的 `Drop` 完成。
//!
//! 缺省策略：
//! - `equal` 未实现：只有同一对象才相等
//! - `hash` 未实现：使用对象地址的低 32 位
//! - `copy` 未实现：不支持复制

use std::any::Any;
use std::fmt;

use crate::error::Result;
use crate::rc::Object;

/// 类描述符（进程内唯一、不可变）
pub struct ClassInfo {
    name: &'static str,
    size: usize,
}

impl ClassInfo {
    /// 为类型 `T` 创建描述符，实例大小取 `T` 的大小
    pub const fn of<T>(name: &'static str) -> Self {
        ClassInfo {
            name,
            size: std::mem::size_of::<T>(),
        }
    }

    /// 类名（仅用于诊断）
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 实例负载大小（不含对象头）
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// 是否为同一个类（按描述符地址比较）
    #[inline]
    pub fn same(&self, other: &ClassInfo) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

/// 向下转型辅助
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 对象实例协议（类描述符里的函数槽）
pub trait Instance: AsAny {
    /// 所属类描述符
    fn class(&self) -> &'static ClassInfo;

    /// 与另一个对象比较；调用前已排除同一对象的情况
    fn equal(&self, _other: &Object) -> bool {
        false
    }

    /// 哈希槽；`None` 表示退回到地址哈希
    fn hash(&self) -> Option<u32> {
        None
    }

    /// 复制槽；`this` 是持有 `self` 的句柄，不可变类型可直接返回它的 retain。
    /// `Ok(None)` 表示该类不支持复制。
    fn copy(&self, _this: &Object) -> Result<Option<Object>> {
        Ok(None)
    }
}

/// 构造协议：以固定形状的参数取代变长参数表
pub trait Construct: Instance + Sized {
    type Args;

    /// 构造失败时返回错误，运行时负责释放已分配的存储
    fn construct(args: Self::Args) -> Result<Self>;
}
