use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// 进程内只初始化一次；过滤规则取自 `ORB_LOG`，缺省 `orb=info`
pub fn init_logging() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_env("ORB_LOG").unwrap_or_else(|_| EnvFilter::new("orb=info"));

        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    });
}
