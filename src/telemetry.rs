//! Optional structured tracing for host applications.
//!
//! The library itself only emits `tracing` events; hosts that want them on
//! disk can call [`init_tracing`], which installs a JSON-lines subscriber
//! when `VOICEGATE_TRACE` is set in the environment.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Where trace output lands: `VOICEGATE_TRACE_LOG` or a temp-dir default.
pub fn trace_log_path() -> PathBuf {
    env::var("VOICEGATE_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("voicegate_trace.jsonl"))
}

/// Install the global JSON subscriber once, if tracing is enabled via
/// `VOICEGATE_TRACE`. Safe to call repeatedly; later calls are no-ops, as is
/// running alongside a subscriber the host already installed.
pub fn init_tracing() {
    if env::var_os("VOICEGATE_TRACE").is_none() {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let path = trace_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::sync::Arc::new(file))
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
