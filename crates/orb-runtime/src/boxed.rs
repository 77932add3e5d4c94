//! 装箱对象
//!
//! OrbBox 持有任意 Rust 值和一个调用方自定的类型标签。
//! 没有 equal / hash / copy 槽：只有同一对象才相等，哈希取地址，不能复制
//! （因此不能作为哈希表的键）。

use std::any::Any;
use std::fmt;

use crate::class::{ClassInfo, Instance};

static BOX_CLASS: ClassInfo = ClassInfo::of::<OrbBox>("OrbBox");

/// 装箱对象
pub struct OrbBox {
    value: Box<dyn Any>,
    tag: u32,
}

impl OrbBox {
    pub fn new<T: Any>(value: T, tag: u32) -> Self {
        OrbBox {
            value: Box::new(value),
            tag,
        }
    }

    /// 用户类型标签
    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }
}

impl Instance for OrbBox {
    fn class(&self) -> &'static ClassInfo {
        &BOX_CLASS
    }
}

impl fmt::Debug for OrbBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrbBox").field("tag", &self.tag).finish_non_exhaustive()
    }
}
