use cfg_if::cfg_if;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        /// Routes tracing to the browser console. Safe to call more than once.
        pub fn init() {
            let wasm_layer = tracing_wasm::WASMLayer::new(tracing_wasm::WASMLayerConfig::default());

            let installed = tracing_subscriber::registry()
                .with(default_filter())
                .with(wasm_layer)
                .try_init()
                .is_ok();

            #[cfg(feature = "console_error_panic_hook")]
            console_error_panic_hook::set_once();

            if installed {
                tracing::debug!("logging initialized");
            }
        }
    } else {
        use once_cell::sync::OnceCell;
        use std::env;
        use std::io;
        use std::path::Path;
        use tracing_appender::non_blocking::WorkerGuard;
        use tracing_subscriber::fmt;

        /// Env var naming a log file; file logging is off when unset.
        pub const LOG_FILE_ENV: &str = "STEPLOOP_LOG_FILE";

        static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

        /// Compact stderr logging, filtered by `RUST_LOG` (default `info`),
        /// plus a daily rolling file when `STEPLOOP_LOG_FILE` is set.
        /// Safe to call more than once.
        pub fn init() {
            let console_layer = fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .compact();

            let file_layer = env::var(LOG_FILE_ENV).ok().map(|log_path| {
                let path = Path::new(&log_path);
                let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
                let file = path.file_name().unwrap_or(std::ffi::OsStr::new("steploop.log"));
                let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file));
                let _ = FILE_GUARD.set(guard);

                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true)
                    .compact()
            });

            let installed = tracing_subscriber::registry()
                .with(default_filter())
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .is_ok();

            if installed {
                tracing::debug!("logging initialized");
            }
        }
    }
}
