//! 运行时配置
//!
//! 默认值可以被环境变量覆盖：
//! - `ORB_BAG_CAPACITY`: Bag 未指定容量时的初始容量
//! - `ORB_BITVECTOR_BITS`: 位向量默认位数

use once_cell::sync::Lazy;

static GLOBAL: Lazy<RuntimeConfig> = Lazy::new(RuntimeConfig::from_env);

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bag 的默认初始容量
    pub bag_capacity: usize,
    /// 位向量的默认位数
    pub bitvector_bits: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bag_capacity: 64,
            bitvector_bits: 16,
        }
    }
}

impl RuntimeConfig {
    /// 从环境变量加载，非法或为零的值保持默认
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(capacity) = read_positive("ORB_BAG_CAPACITY") {
            config.bag_capacity = capacity;
        }
        if let Some(bits) = read_positive("ORB_BITVECTOR_BITS") {
            config.bitvector_bits = bits;
        }

        config
    }

    /// 进程内共享的配置，首次访问时从环境变量加载
    pub fn global() -> &'static RuntimeConfig {
        &GLOBAL
    }
}

fn read_positive(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid config value");
            None
        }
    }
}
