use crate::config_file::RunConfigFile;
use crate::error::{FlowError, Result};
use clap::ArgMatches;
use std::path::Path;

pub fn generate_config(app_m: &ArgMatches) -> Result<()> {
	let output_path = app_m.value_of("OUTPUT_FILE").unwrap_or("msoe_config.toml");

	if Path::new(output_path).exists() && !app_m.is_present("FORCE") {
		return Err(FlowError::Config(format!(
			"file {} already exists; use --force to overwrite",
			output_path
		)));
	}

	RunConfigFile::default().to_toml_file(output_path)?;
	info!("generated configuration file: {}", output_path);
	info!("edit it and start a run with:");
	info!("  msoe-rust train <TRAINING_FOLDER> --config {}", output_path);
	Ok(())
}
