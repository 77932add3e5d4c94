//! Orb Runtime Library
//!
//! 提供引用计数对象模型与一组通用容器
//!
//! ## 模块结构
//! - `class`: 类描述符与实例协议（equal / hash / copy）
//! - `rc`: 对象头与引用计数句柄
//! - `refpool`: 引用池（作用域批量释放）
//! - `map`: 开放寻址哈希表
//! - `array`: 有序数组（拥有元素）
//! - `bag`: 无序集合（O(1) 删除）
//! - `string`: 字符串
//! - `value`: 布尔、整数、浮点包装
//! - `boxed`: 任意值装箱
//! - `bitvector`: 位向量
//! - `range`: 区间
//! - `hash`: one-at-a-time 哈希
//! - `config`: 运行时配置
//! - `ffi`: C ABI

mod array;
mod bag;
mod bitvector;
mod boxed;
mod class;
mod config;
mod error;
mod ffi;
mod hash;
mod map;
mod range;
mod rc;
mod refpool;
mod string;
mod value;

pub use array::*;
pub use bag::*;
pub use bitvector::*;
pub use boxed::*;
pub use class::*;
pub use config::*;
pub use error::*;
pub use ffi::*;
pub use hash::*;
pub use map::*;
pub use range::*;
pub use rc::*;
pub use refpool::*;
pub use string::*;
pub use value::*;
