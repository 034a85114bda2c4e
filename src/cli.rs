use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

pub fn build_cli() -> ArgMatches<'static> {
	App::new("msoe-rust")
		.version("v0.1.0")
		.about("Multi-scale motion-energy network for dense optical flow")
		.settings(&[AppSettings::SubcommandRequiredElseHelp, AppSettings::VersionlessSubcommands])
		.subcommand(build_train_subcommand())
		.subcommand(build_validate_subcommand())
		.subcommand(build_finalize_subcommand())
		.subcommand(build_generate_config_subcommand())
		.get_matches()
}

fn build_train_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("train")
		.about("Train flow parameters on a folder of frame-pair/flow samples")
		.arg(
			Arg::with_name("TRAINING_FOLDER")
				.required(true)
				.index(1)
				.help("Folder of <stem>_img1/<stem>_img2 images and <stem>_flow.flo fields"),
		)
		.arg(build_config_arg())
		.arg(build_validation_folder_arg())
		.arg(build_run_id_arg())
		.arg(build_output_root_arg())
		.arg(build_learning_rate_arg())
		.arg(build_batch_size_arg())
		.arg(build_iterations_arg())
		.arg(build_scales_arg())
		.arg(build_threads_arg())
		.arg(build_seed_arg())
		.arg(build_gpu_arg())
		.arg(
			Arg::with_name("RESUME")
				.long("resume")
				.conflicts_with("FRESH")
				.help("Resume from the newest snapshot without prompting"),
		)
		.arg(
			Arg::with_name("FRESH")
				.long("fresh")
				.help("Delete existing snapshots and start over without prompting"),
		)
}

fn build_validate_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("validate")
		.about("Measure endpoint error of saved parameters over a held-out folder")
		.arg(
			Arg::with_name("VALIDATION_FOLDER")
				.required(true)
				.index(1)
				.help("Folder of held-out frame-pair/flow samples"),
		)
		.arg(
			Arg::with_name("CHECKPOINT_FILE")
				.required(true)
				.index(2)
				.help("Checkpoint file (.msoe) holding the parameters to evaluate"),
		)
		.arg(build_batch_size_arg())
		.arg(build_scales_arg())
}

fn build_finalize_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("finalize")
		.about("Copy the newest snapshot of a run out to a standalone parameter file")
		.arg(
			Arg::with_name("SNAPSHOT_FOLDER")
				.required(true)
				.index(1)
				.help("A run's snapshot folder"),
		)
		.arg(
			Arg::with_name("OUTPUT_FILE")
				.required(true)
				.index(2)
				.help("Destination parameter file (.msoe)"),
		)
}

fn build_generate_config_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("generate-config")
		.about("Write a TOML run configuration filled with the defaults")
		.arg(
			Arg::with_name("OUTPUT_FILE")
				.index(1)
				.help("Where to write the file. Default: msoe_config.toml"),
		)
		.arg(
			Arg::with_name("FORCE")
				.long("force")
				.help("Overwrite the output file if it already exists"),
		)
}

fn build_config_arg() -> Arg<'static, 'static> {
	Arg::with_name("CONFIG")
		.short("c")
		.long("config")
		.value_name("TOML_FILE")
		.help("Run configuration file; command-line options override its values")
		.empty_values(false)
}

fn build_validation_folder_arg() -> Arg<'static, 'static> {
	Arg::with_name("VALIDATION_FOLDER")
		.short("v")
		.long("val_folder")
		.value_name("FOLDER")
		.help("Held-out samples evaluated on the validation cadence")
		.empty_values(false)
}

fn build_run_id_arg() -> Arg<'static, 'static> {
	Arg::with_name("RUN_ID")
		.long("run-id")
		.value_name("NAME")
		.help("Names the snapshot and log subdirectories for this run")
		.empty_values(false)
}

fn build_output_root_arg() -> Arg<'static, 'static> {
	Arg::with_name("OUTPUT_ROOT")
		.long("output-root")
		.value_name("FOLDER")
		.help("Root under which snapshots/ and logs/ are created. Default: current directory")
		.empty_values(false)
}

fn build_learning_rate_arg() -> Arg<'static, 'static> {
	Arg::with_name("LEARNING_RATE")
		.short("R")
		.long("rate")
		.value_name("LEARNING_RATE")
		.help("Adam learning rate. Default: 0.012")
		.empty_values(false)
}

fn build_batch_size_arg() -> Arg<'static, 'static> {
	Arg::with_name("BATCH_SIZE")
		.short("b")
		.long("batch_size")
		.value_name("BATCH_SIZE")
		.help("Frame pairs per optimization step. Default: 4")
		.empty_values(false)
}

fn build_iterations_arg() -> Arg<'static, 'static> {
	Arg::with_name("ITERATIONS")
		.short("i")
		.long("iterations")
		.value_name("STEPS")
		.help("Total optimization steps. Default: 600000")
		.empty_values(false)
}

fn build_scales_arg() -> Arg<'static, 'static> {
	Arg::with_name("SCALES")
		.short("s")
		.long("scales")
		.value_name("SCALES")
		.help("Pyramid scale count. Default: 5")
		.empty_values(false)
}

fn build_threads_arg() -> Arg<'static, 'static> {
	Arg::with_name("THREADS")
		.short("t")
		.long("threads")
		.value_name("THREADS")
		.help("Background data-loader threads. Default: 6")
		.empty_values(false)
}

fn build_seed_arg() -> Arg<'static, 'static> {
	Arg::with_name("SEED")
		.long("seed")
		.value_name("SEED")
		.help("Parameter initialisation seed. Default: 0")
		.empty_values(false)
}

fn build_gpu_arg() -> Arg<'static, 'static> {
	Arg::with_name("GPU")
		.long("gpu")
		.help("Accepted for compatibility; this build always runs on CPU")
}
