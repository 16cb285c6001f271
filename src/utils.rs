//! 浏览器环境辅助：控制台日志与 panic hook。

/// 输出一条普通日志。非 wasm 目标（例如本地测试）下不做任何事。
pub fn log(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::log_1(&message.into());
    #[cfg(not(target_arch = "wasm32"))]
    let _ = message;
}

/// 输出一条警告日志。
pub fn warn(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::warn_1(&message.into());
    #[cfg(not(target_arch = "wasm32"))]
    let _ = message;
}

#[macro_export]
macro_rules! console_log {
    ($($arg:tt)*) => {
        $crate::utils::log(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! console_warn {
    ($($arg:tt)*) => {
        $crate::utils::warn(&format!($($arg)*))
    };
}

#[cfg(feature = "console_error_panic_hook")]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
pub fn set_panic_hook() {}
