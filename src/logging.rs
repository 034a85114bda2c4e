use env_logger::{Builder, Env};
use std::io::Write;

/// Logger for CLI runs: info level unless `RUST_LOG` says otherwise, with a
/// timestamp so long training logs stay interpretable.
pub fn init_logger() {
	Builder::from_env(Env::default().default_filter_or("info"))
		.format(|buf, record| {
			writeln!(
				buf,
				"{} [{}] {}",
				chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
				record.level(),
				record.args()
			)
		})
		.init();
}
