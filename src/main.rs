extern crate msoe_rust;
#[macro_use]
extern crate log;

use msoe_rust::{cli, commands, logging};

fn main() {
	logging::init_logger();

	let app_m = cli::build_cli();

	let result = match app_m.subcommand() {
		("train", Some(sub_m)) => commands::train(sub_m),
		("validate", Some(sub_m)) => commands::validate(sub_m),
		("finalize", Some(sub_m)) => commands::finalize(sub_m),
		("generate-config", Some(sub_m)) => commands::generate_config(sub_m),
		_ => unreachable!("subcommand is required"),
	};

	if let Err(err) = result {
		error!("Error: {}", err);
		std::process::exit(1);
	}
}
