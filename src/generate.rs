//! Drives one complete CSV to container conversion.
//!
//! A run moves through `Idle -> Building -> Writing -> Finalized`. Any error
//! while building or writing moves it to `Failed` instead, and the output
//! file, if it was created, is removed so that no partial container is left
//! behind. A configuration or input that is rejected before the output is
//! created leaves the driver `Idle`.
use std::{fs::File, io::Read, path::{Path, PathBuf}};

use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::ContainerBuilder;
use crate::config::GeneratorConfig;
use crate::container::ContainerBackend;
use crate::decode::CsvRows;
use crate::error::{DecodeError, GenerationError, SchemaError};
use crate::writer::{SeriesWriter, WriteSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DriverState {
    Idle,
    Building,
    Writing,
    Finalized,
    Failed,
}

/// Deletes the output file when dropped, unless the run succeeded.
///
/// The guard only becomes armed once the file has actually been created, so
/// a pre-existing file is never touched by a run that failed before creating
/// its output.
struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf(), armed: false }
    }

    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::info!("Removed incomplete output file {}", self.path.display()),
            Err(e) => log::warn!("Could not remove incomplete output file {}: {e}", self.path.display()),
        }
    }
}

/// Set up a progress bar for the row loop.
fn setup_write_pb(pb: &ProgressBar, nrows: usize, file_id: &str) {
    pb.set_length(nrows as u64);
    pb.set_position(0);
    if let Ok(style) = ProgressStyle::with_template("{prefix} {wide_bar} [{human_pos}/{human_len}]") {
        pb.set_style(style);
    }
    pb.set_prefix(format!("Writing {file_id}"));
    pb.tick();
}

pub struct GenerationDriver<'a> {
    config: &'a GeneratorConfig,
    state: DriverState,
    generated_at: DateTime<Utc>,
    progress: Option<ProgressBar>,
}

impl<'a> GenerationDriver<'a> {
    pub fn new(config: &'a GeneratorConfig) -> Self {
        Self { config, state: DriverState::Idle, generated_at: Utc::now(), progress: None }
    }

    /// Use a fixed generation instant (for the date attributes) instead of the current time.
    pub fn with_generation_time(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn with_progress_bar(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Convert the CSV file at `input` into a container at `output`.
    pub fn run<B: ContainerBackend>(&mut self, input: &Path, output: &Path) -> error_stack::Result<WriteSummary, GenerationError> {
        if self.state != DriverState::Idle {
            return Err(GenerationError::InvalidState(self.state.to_string()).into());
        }

        let f = File::open(input)
            .change_context_lazy(|| GenerationError::InputError(input.to_path_buf()))?;
        self.run_inner::<B, _>(f, input, output)
    }

    /// Convert CSV text read from `input` into a container at `output`.
    pub fn run_reader<B: ContainerBackend, R: Read>(&mut self, input: R, output: &Path) -> error_stack::Result<WriteSummary, GenerationError> {
        self.run_inner::<B, R>(input, Path::new("<stream>"), output)
    }

    fn run_inner<B: ContainerBackend, R: Read>(&mut self, input: R, input_name: &Path, output: &Path)
    -> error_stack::Result<WriteSummary, GenerationError> {
        if self.state != DriverState::Idle {
            return Err(GenerationError::InvalidState(self.state.to_string()).into());
        }

        let mut guard = OutputGuard::new(output);
        let res = self.execute::<B, R>(input, input_name, output, &mut guard);
        match &res {
            Ok(summary) => {
                guard.disarm();
                self.state = DriverState::Finalized;
                log::info!("Wrote {} rows to {}", summary.rows, output.display());
            },
            Err(e) => {
                if matches!(self.state, DriverState::Building | DriverState::Writing) {
                    self.state = DriverState::Failed;
                }
                log::error!("Generation of {} failed: {}", output.display(), e.current_context());
            }
        }
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
        res
    }

    fn execute<B: ContainerBackend, R: Read>(&mut self, input: R, input_name: &Path, output: &Path, guard: &mut OutputGuard)
    -> error_stack::Result<WriteSummary, GenerationError> {
        let config = self.config;

        // Everything that can be checked without the output is checked before it exists.
        config.validate()
            .change_context_lazy(|| GenerationError::schema_violation("invalid station or variable definitions"))?;
        config.validate_options()
            .change_context_lazy(|| GenerationError::schema_violation("invalid configuration"))?;
        let encoder = config.time.encoder()
            .change_context_lazy(|| GenerationError::schema_violation("invalid time epoch"))?;
        let file_id = output.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let column_error = |e: error_stack::Report<DecodeError>| {
            let ctx = match e.current_context() {
                DecodeError::ColumnMapping => GenerationError::schema_violation("source columns do not match the input"),
                _ => GenerationError::InputError(input_name.to_path_buf()),
            };
            e.change_context(ctx)
        };
        let mut rows = CsvRows::from_reader(input, &config.variables, config.row_count)
            .map_err(column_error)?;
        if let Some(col) = &config.station.position.vertical_column {
            rows = rows.with_vertical_column(col).map_err(column_error)?;
        }

        self.state = DriverState::Building;
        let mut nc = B::create(output)
            .change_context(GenerationError::build_failure("create"))?;
        guard.arm();

        ContainerBuilder::new(config, encoder, &file_id, self.generated_at)
            .build(&mut nc)?;

        self.state = DriverState::Writing;
        let mut writer = SeriesWriter::new(&config.variables, &config.station.position, encoder);
        writer.write_station(&mut nc)
            .change_context(GenerationError::ContainerWriteFailure { row: 0 })?;

        if let Some(pb) = &self.progress {
            setup_write_pb(pb, config.row_count, &file_id);
        }

        for res in rows.by_ref() {
            let sample = res.map_err(|e| {
                let row = e.current_context().row();
                e.change_context(GenerationError::MalformedRow { row })
            })?;
            let row = writer.rows_written() + 1;
            writer.append(&mut nc, &sample)
                .change_context(GenerationError::ContainerWriteFailure { row })?;
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        if rows.consumed() < config.row_count {
            let err = SchemaError::RowCountMismatch { declared: config.row_count, available: rows.consumed() };
            return Err(error_stack::Report::new(err))
                .change_context(GenerationError::schema_violation("row count mismatch"));
        }

        nc.close().change_context(GenerationError::FinalizeFailure)?;

        let summary = writer.summary();
        for var in summary.variables.iter() {
            if var.fallbacks > 0 {
                log::info!("{}: {} value(s) could not be parsed and were written as the fill value", var.name, var.fallbacks);
            }
            if var.out_of_range > 0 {
                log::warn!("{}: {} value(s) are outside the valid range", var.name, var.out_of_range);
            }
        }
        Ok(summary)
    }
}
