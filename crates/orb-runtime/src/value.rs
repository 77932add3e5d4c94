//! 不可变值包装：布尔、整数、浮点
//!
//! 三者的 copy 都只是 retain，相等只在同类之间按值比较。

use std::fmt;

use crate::class::{ClassInfo, Construct, Instance};
use crate::error::Result;
use crate::rc::Object;

static BOOL_CLASS: ClassInfo = ClassInfo::of::<OrbBool>("OrbBool");
static INT_CLASS: ClassInfo = ClassInfo::of::<OrbInt>("OrbInt");
static DOUBLE_CLASS: ClassInfo = ClassInfo::of::<OrbDouble>("OrbDouble");

// ==================== OrbBool ====================

/// 布尔对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrbBool {
    value: bool,
}

impl OrbBool {
    pub fn new(value: bool) -> Self {
        OrbBool { value }
    }

    /// 分配并擦除类型
    pub fn object(value: bool) -> Result<Object> {
        Object::from_instance(Self::new(value))
    }

    #[inline]
    pub fn value(&self) -> bool {
        self.value
    }
}

impl Instance for OrbBool {
    fn class(&self) -> &'static ClassInfo {
        &BOOL_CLASS
    }

    fn equal(&self, other: &Object) -> bool {
        other
            .downcast_ref::<OrbBool>()
            .is_some_and(|other| other.value == self.value)
    }

    fn hash(&self) -> Option<u32> {
        Some(self.value as u32)
    }

    fn copy(&self, this: &Object) -> Result<Option<Object>> {
        Ok(Some(this.retain()))
    }
}

impl Construct for OrbBool {
    type Args = bool;

    fn construct(value: bool) -> Result<Self> {
        Ok(Self::new(value))
    }
}

impl fmt::Display for OrbBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

// ==================== OrbInt ====================

/// 整数对象（64 位有符号）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrbInt {
    value: i64,
}

impl OrbInt {
    pub fn new(value: i64) -> Self {
        OrbInt { value }
    }

    /// 分配并擦除类型
    pub fn object(value: i64) -> Result<Object> {
        Object::from_instance(Self::new(value))
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.value
    }
}

impl Instance for OrbInt {
    fn class(&self) -> &'static ClassInfo {
        &INT_CLASS
    }

    fn equal(&self, other: &Object) -> bool {
        other
            .downcast_ref::<OrbInt>()
            .is_some_and(|other| other.value == self.value)
    }

    /// 取低 32 位
    fn hash(&self) -> Option<u32> {
        Some(self.value as u32)
    }

    fn copy(&self, this: &Object) -> Result<Option<Object>> {
        Ok(Some(this.retain()))
    }
}

impl Construct for OrbInt {
    type Args = i64;

    fn construct(value: i64) -> Result<Self> {
        Ok(Self::new(value))
    }
}

impl fmt::Display for OrbInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

// ==================== OrbDouble ====================

/// 浮点对象
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbDouble {
    value: f64,
}

impl OrbDouble {
    pub fn new(value: f64) -> Self {
        OrbDouble { value }
    }

    /// 分配并擦除类型
    pub fn object(value: f64) -> Result<Object> {
        Object::from_instance(Self::new(value))
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Instance for OrbDouble {
    fn class(&self) -> &'static ClassInfo {
        &DOUBLE_CLASS
    }

    /// IEEE 比较：NaN 不等于任何值（包括自身的另一份）
    fn equal(&self, other: &Object) -> bool {
        other
            .downcast_ref::<OrbDouble>()
            .is_some_and(|other| other.value == self.value)
    }

    /// 高低 32 位异或折叠；+0.0 与 -0.0 相等，哈希也必须相同
    fn hash(&self) -> Option<u32> {
        let value = if self.value == 0.0 { 0.0 } else { self.value };
        let bits = value.to_bits();
        Some((bits ^ (bits >> 32)) as u32)
    }

    fn copy(&self, this: &Object) -> Result<Option<Object>> {
        Ok(Some(this.retain()))
    }
}

impl Construct for OrbDouble {
    type Args = f64;

    fn construct(value: f64) -> Result<Self> {
        Ok(Self::new(value))
    }
}

impl fmt::Display for OrbDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
