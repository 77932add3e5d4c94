//! 运行时错误类型
//!
//! 查找未命中、越界访问不属于错误，统一用 `Option` / `bool` 返回。

use thiserror::Error;

/// 运行时错误
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// 内存分配失败（对象分配、容器扩容、池登记）
    #[error("allocation failed for {what} ({size} bytes)")]
    AllocationFailed { what: &'static str, size: usize },

    /// 构造函数报告失败，已分配的存储已释放
    #[error("constructor of {class} failed")]
    ConstructionFailed {
        class: &'static str,
        #[source]
        source: Box<RuntimeError>,
    },

    /// 哈希表重建失败（无法分配或找不到空槽）
    #[error("map resize to capacity {capacity} failed")]
    ResizeFailed { capacity: usize },

    /// 对象所属类没有提供 copy 槽
    #[error("class {class} does not support copy")]
    CopyUnsupported { class: &'static str },

    /// 当前没有任何引用池
    #[error("no ref pool is current")]
    NoCurrentPool,

    /// 引用池已被弹出
    #[error("ref pool has already been popped")]
    StalePool,

    /// 容器正被借用（例如在键的 equal/copy 槽里修改同一个表）
    #[error("{what} is already borrowed")]
    BorrowConflict { what: &'static str },
}

impl RuntimeError {
    pub(crate) fn alloc<T>(what: &'static str, count: usize) -> Self {
        RuntimeError::AllocationFailed {
            what,
            size: count.saturating_mul(std::mem::size_of::<T>()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
