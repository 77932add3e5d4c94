//! Orb 字符串
//!
//! OrbString 持有一段可变的 UTF-8 文本：
//! - 相等：字节逐一相等
//! - 哈希：one-at-a-time 作用于全部字节
//! - 复制：深拷贝，副本与原串互不影响
//!
//! 所有位置和长度都以字节计。

use std::cell::RefCell;
use std::fmt;

use crate::class::{ClassInfo, Construct, Instance};
use crate::error::{Result, RuntimeError};
use crate::hash::hash_bytes;
use crate::range::OrbRange;
use crate::rc::{Object, OrbRc};

static STRING_CLASS: ClassInfo = ClassInfo::of::<OrbString>("OrbString");

/// Orb 字符串对象
pub struct OrbString {
    text: RefCell<String>,
}

impl OrbString {
    /// 复制一份文本作为内容
    pub fn new(text: &str) -> Result<Self> {
        Ok(OrbString {
            text: RefCell::new(owned(text)?),
        })
    }

    /// 分配并擦除类型
    pub fn object(text: &str) -> Result<Object> {
        Ok(OrbRc::<OrbString>::construct(owned(text)?)?.into_object())
    }

    /// 字节长度
    pub fn len(&self) -> usize {
        self.text.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_std_string(&self) -> String {
        self.text.borrow().clone()
    }

    /// 替换全部内容
    pub fn set(&self, text: &str) -> Result<()> {
        let replacement = owned(text)?;
        *self.text.borrow_mut() = replacement;
        Ok(())
    }

    /// 追加另一个字符串；可以追加自身
    pub fn append(&self, other: &OrbString) -> Result<()> {
        let tail = other.to_std_string();
        self.append_str(&tail)
    }

    pub fn append_str(&self, tail: &str) -> Result<()> {
        let mut text = self.text.borrow_mut();
        text.try_reserve(tail.len())
            .map_err(|_| RuntimeError::alloc::<u8>("string", text.len() + tail.len()))?;
        text.push_str(tail);
        Ok(())
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.text.borrow().as_bytes().starts_with(prefix.as_bytes())
    }

    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.text.borrow().as_bytes().ends_with(suffix.as_bytes())
    }

    /// 在 `range` 内查找子串，返回第一次出现的字节偏移
    ///
    /// `range.length == usize::MAX` 表示一直到串尾；范围越界或
    /// 子串比范围长时返回 `None`。
    pub fn find(&self, substr: &str, range: OrbRange) -> Option<usize> {
        let text = self.text.borrow();
        let haystack = text.as_bytes();
        let needle = substr.as_bytes();

        if range.start > haystack.len() {
            return None;
        }
        let length = if range.is_to_end() {
            haystack.len() - range.start
        } else {
            range.length
        };
        let end = range.start.checked_add(length)?;
        if end > haystack.len() || needle.len() > length {
            return None;
        }

        (range.start..=end - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
    }

    /// 顺序拼接若干片段
    pub fn join(parts: &[&str]) -> String {
        parts.concat()
    }
}

fn owned(text: &str) -> Result<String> {
    let mut s = String::new();
    s.try_reserve_exact(text.len())
        .map_err(|_| RuntimeError::alloc::<u8>("string", text.len()))?;
    s.push_str(text);
    Ok(s)
}

impl Instance for OrbString {
    fn class(&self) -> &'static ClassInfo {
        &STRING_CLASS
    }

    fn equal(&self, other: &Object) -> bool {
        match other.downcast_ref::<OrbString>() {
            Some(other) => *self.text.borrow() == *other.text.borrow(),
            None => false,
        }
    }

    fn hash(&self) -> Option<u32> {
        Some(hash_bytes(self.text.borrow().as_bytes()))
    }

    fn copy(&self, _this: &Object) -> Result<Option<Object>> {
        let text = self.text.borrow();
        Ok(Some(OrbString::object(&text)?))
    }
}

impl Construct for OrbString {
    type Args = String;

    fn construct(text: String) -> Result<Self> {
        Ok(OrbString {
            text: RefCell::new(text),
        })
    }
}

impl fmt::Display for OrbString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text.borrow())
    }
}

impl fmt::Debug for OrbString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OrbString").field(&*self.text.borrow()).finish()
    }
}
