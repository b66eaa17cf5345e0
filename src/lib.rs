/// Macro for prefixed status logging to stderr (only when stderr is a terminal).
///
/// Usage:
/// ```ignore
/// log_status!("run", "Task {}: {} {}", position, command, operation);
/// log_status!("cleanup", "Could not remove {}", path);
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        if ::std::io::IsTerminal::is_terminal(&::std::io::stderr()) {
            eprintln!(concat!("[", $prefix, "] {}"), format_args!($($arg)*));
        }
    };
}

pub mod core;
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `transtats_jobs::engine` instead of `transtats_jobs::core::engine`
pub use core::*;
pub use utils::*;
