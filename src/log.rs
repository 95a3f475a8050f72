use {
	crate::global::*,
	std::{
		fs::{self, File},
		io::{BufWriter, Write},
		path::Path,
		sync::Once,
	},
	tracing::error,
	tracing_appender::rolling,
	tracing_subscriber::{
		EnvFilter, Layer, fmt::time::SystemTime, layer::SubscriberExt, util::SubscriberInitExt,
	},
};

static INIT_LOG: Once = Once::new();

/// When the program panics, the backtrace is outputted to `logs/crash.log`.
pub fn init_panic_handler() {
	std::panic::set_hook(Box::new(move |panic_info| {
		const WRITE_ERR: &str = "Could not write to crash log";
		error!("{}", panic_info);
		eprintln!("{}", panic_info);

		fs::create_dir_all(LOG_DIR).expect("Could not create crash log dir");
		let file = File::create(Path::new(LOG_DIR).join(CRASH_LOG))
			.expect("Could not create crash log file");
		let backtrace = std::backtrace::Backtrace::capture();
		let mut writer = BufWriter::new(file);

		writeln!(writer, "Time: {}", chrono::Local::now()).expect(WRITE_ERR);
		writeln!(writer, "{panic_info}").expect(WRITE_ERR);
		writeln!(writer, "stack backtrace:\n{backtrace}").expect(WRITE_ERR);
		writer.flush().expect(WRITE_ERR);
	}));
}

/// Filter resolution order: `LOG_LEVEL`, then `RUST_LOG`, then `info`.
fn env_filter() -> EnvFilter {
	if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
		return EnvFilter::new(level);
	}
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Creates a tracing registry with two layers: a compact stdout layer for
/// operating the server, and a file layer writing `logs/latest.log`.
pub fn init_logger() {
	INIT_LOG.call_once(|| {
		_ = fs::remove_file(Path::new(LOG_DIR).join(LATEST_LOG));
		let (log_writer, log_guard) =
			tracing_appender::non_blocking(rolling::never(LOG_DIR, LATEST_LOG));
		let latest_log_layer = tracing_subscriber::fmt::layer()
			.with_timer(SystemTime)
			.with_ansi(false)
			.log_internal_errors(true)
			.with_target(true)
			.with_file(true)
			.with_line_number(true)
			.with_level(true)
			.with_writer(log_writer)
			.with_filter(env_filter());
		let stdout_layer = tracing_subscriber::fmt::layer()
			.with_timer(SystemTime)
			.compact()
			.with_filter(env_filter());
		tracing_subscriber::registry()
			.with(latest_log_layer)
			.with(stdout_layer)
			.init();

		// log_guard has to have a static lifetime.
		// We can just let the OS clean it up for us when the process is killed.
		Box::leak(Box::new(log_guard));
	})
}
