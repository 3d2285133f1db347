use std::{path::Path, process::ExitCode};

use clap::Parser;
use error_stack::ResultExt;
use indicatif::ProgressBar;
use itertools::Itertools;
use stationnc::{
    config::{write_template, GeneratorConfig},
    container::{MemoryBackend, OutputFormat},
    generate::GenerationDriver,
    logging::init_logging,
    schema::SourceColumn,
};

mod cli;
mod errors;

use errors::CliError;

fn main() -> ExitCode {
    let clargs = cli::Cli::parse();
    init_logging(clargs.verbosity.log_level_filter(), clargs.log_file.as_deref());
    if let Err(e) = main_inner(clargs) {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_inner(clargs: cli::Cli) -> error_stack::Result<(), CliError> {
    match clargs.command {
        cli::Commands::Generate(gen_cli) => generate(gen_cli),
        cli::Commands::Template(template_cli) => {
            write_template(&template_cli.template_file)
                .change_context_lazy(|| CliError::runtime_error(format!(
                    "could not write template to {}", template_cli.template_file.display()
                )))
        },
        cli::Commands::Check(check_cli) => check(&check_cli.config),
    }
}

fn load_config(path: &Path) -> error_stack::Result<GeneratorConfig, CliError> {
    GeneratorConfig::load(path)
        .change_context_lazy(|| CliError::input_error(format!(
            "could not load configuration from {}", path.display()
        )))
}

fn generate(cli: cli::GenerateCli) -> error_stack::Result<(), CliError> {
    let mut config = load_config(&cli.config)?;
    if let Some(input) = cli.input {
        config.input = Some(input);
    }
    if let Some(output) = cli.output {
        config.output = Some(output);
    }
    if let Some(format) = cli.format {
        config.format = format;
    }

    let input = config.input.clone()
        .ok_or_else(|| CliError::usage_error("no input file was given in the configuration or with --input"))?;
    let output = config.output.clone()
        .ok_or_else(|| CliError::usage_error("no output file was given in the configuration or with --output"))?;

    let pb = if cli.no_progress { ProgressBar::hidden() } else { ProgressBar::new(0) };
    let mut driver = GenerationDriver::new(&config).with_progress_bar(pb);

    let res = match config.format {
        OutputFormat::Json => driver.run::<MemoryBackend>(&input, &output),
        #[cfg(feature = "netcdf")]
        OutputFormat::Netcdf => driver.run::<stationnc::container::NetcdfBackend>(&input, &output),
        #[cfg(not(feature = "netcdf"))]
        OutputFormat::Netcdf => {
            return Err(CliError::usage_error(
                "this build of csv2nc cannot write netCDF files; use --format json or rebuild with the 'netcdf' feature"
            ).into());
        },
    };

    let summary = res.map_err(|e| {
        let cli_err = CliError::from(e.current_context());
        e.change_context(cli_err)
    })?;

    if summary.variables.iter().any(|v| v.fallbacks > 0 || v.out_of_range > 0) {
        println!("{}", tabled::Table::new(&summary.variables));
    }
    Ok(())
}

#[derive(tabled::Tabled)]
struct VariableRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Standard name")]
    standard_name: String,
    #[tabled(rename = "Units")]
    units: String,
    #[tabled(rename = "Storage")]
    kind: String,
    #[tabled(rename = "Fill")]
    fill: f64,
    #[tabled(rename = "Valid range")]
    valid_range: String,
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Instrument")]
    instrument: String,
}

fn check(config_file: &Path) -> error_stack::Result<(), CliError> {
    let config = load_config(config_file)?;
    config.validate()
        .change_context_lazy(|| CliError::input_error(format!("{} is not a valid station configuration", config_file.display())))?;
    config.validate_options()
        .change_context_lazy(|| CliError::input_error(format!("{} has an invalid option", config_file.display())))?;
    if !config.format.is_available() {
        log::warn!("This build cannot write {} output; `generate` will need --format json", config.format);
    }

    // Without the CSV header, named columns (and those following them) can only be shown by name.
    let rows = config.variables.iter().scan(Some(stationnc::schema::TIMESTAMP_FIELDS), |next, var| {
        let column = match (&var.source_column, *next) {
            (None, Some(c)) => { *next = Some(c + 1); format!("#{c}") },
            (None, None) => "(after previous)".to_string(),
            (Some(SourceColumn::Index(i)), _) => { *next = Some(i + 1); format!("#{i}") },
            (Some(col), _) => { *next = None; col.to_string() },
        };
        Some(VariableRow {
            name: var.name.clone(),
            standard_name: var.standard_name.clone(),
            units: var.units.clone(),
            kind: var.kind.to_string(),
            fill: var.fill_value,
            valid_range: format!("[{}, {}]", var.valid_min, var.valid_max),
            column,
            instrument: var.instrument.clone().unwrap_or_default(),
        })
    }).collect_vec();

    println!("Station {} ({}), {} rows", config.station.urn, config.station.description, config.row_count);
    println!("{}", tabled::Table::new(rows));
    Ok(())
}
