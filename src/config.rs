//! Configuration of one generation run.
//!
//! A run is described by a [TOML](https://toml.io/en/) file. The top level gives
//! the input and output paths and the number of data rows to convert:
//!
//! ```toml
//! input = "gcoos_ioos_station_USF_COMPS_C10_2015_11_atm.csv"
//! output = "gcoos_ioos_station_USF_COMPS_C10_2015_11_atm.nc"
//! row_count = 1110
//! ```
//!
//! Relative paths are interpreted relative to the current directory, not the
//! configuration file. The output file stem becomes the `id` global attribute.
//!
//! # Station
//!
//! The `[station]` table identifies the station, and `[station.position]` fixes
//! its location for the whole file:
//!
//! ```toml
//! [station]
//! urn = "ioos:station:USF.COMPS:C10"
//! description = "C10: Navy-2"
//! naming_authority = "ioos:station:USF.COMPS"
//! url = "http://comps.marine.usf.edu/"
//!
//! [station.position]
//! latitude = 27.169
//! longitude = -82.926
//! vertical = 3.0
//! vertical_sense = "up"
//!
//! [station.platform]
//! wmo_code = "42013"
//! ncei_code = "147F, 3614"
//! ```
//!
//! `vertical_sense` must be given: use "up" for an altitude (atmospheric
//! stations) and "down" for a depth (oceanographic stations). By default the
//! position is stored once per file; set `layout = "per_row"` in
//! `[station.position]` to repeat it on every row instead. With the per-row
//! layout, the vertical position can also be read from the input:
//!
//! ```toml
//! [station.position]
//! latitude = 27.169
//! longitude = -82.926
//! vertical = 2.0
//! vertical_sense = "down"
//! layout = "per_row"
//! vertical_column = "depth"
//! vertical_valid_range = [0.0, 30.0]
//! ```
//!
//! `vertical_column` is a header name or a 0-based field index. Unparsable
//! depths are written as the fill value -999.
//!
//! # Variables
//!
//! Each `[[variables]]` entry defines one data variable, in the order the
//! variables appear in the output:
//!
//! ```toml
//! [[variables]]
//! name = "air_pressure"
//! standard_name = "air_pressure"
//! units = "mbar"
//! fill_value = -999.0
//! valid_min = 700.0
//! valid_max = 1040.0
//! instrument = "met"
//! ```
//!
//! The fill value must lie outside `[valid_min, valid_max]`. Values are read
//! from the field after the previous variable's unless `source_column` is
//! given, either as a 0-based field index (the date and time are fields 0 and
//! 1) or as a column name from the input's header line. `kind = "integer"`,
//! `scale_factor` and `add_offset` control how values are stored.
//!
//! Instruments referenced by variables are defined in `[[instruments]]`:
//!
//! ```toml
//! [[instruments]]
//! id = "met"
//! long_name = "RM Young 61202V, RM Young 41372VC/Analog 1 V Single"
//! comment = "Atmospheric probe and wind sensor"
//! ```
//!
//! # Other sections
//!
//! - `[time]` sets the `epoch` of the time axis (default "1970-01-01 00:00:00").
//! - `[metadata]` gives the descriptive global attributes (see [`GlobalMetadata`]),
//!   with arbitrary additional ones in `[metadata.extra]`.
//! - `[crs]` overrides the WGS84 horizontal datum.
//!
//! # Environment overrides
//!
//! Any value may be overridden by an environment variable named `STATIONNC_`
//! followed by the key, with `__` separating nested keys, e.g.
//! `STATIONNC_ROW_COUNT=24` or `STATIONNC_STATION__URL=...`.
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::{Deserialize, Serialize};

use crate::container::OutputFormat;
use crate::error::{ConfigError, SchemaError};
use crate::metadata::GlobalMetadata;
use crate::schema::{SchemaTable, SourceColumn, VariableSchema};
use crate::station::{HorizontalDatum, Instrument, PlatformInfo, Position, PositionLayout, StationDescriptor, VerticalSense};
use crate::time::{parse_epoch, TimeEncoder};

pub const ENV_PREFIX: &str = "STATIONNC_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeConfig {
    #[serde(default = "default_epoch")]
    pub epoch: String,
}

fn default_epoch() -> String {
    "1970-01-01 00:00:00".to_string()
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self { epoch: default_epoch() }
    }
}

impl TimeConfig {
    pub fn encoder(&self) -> Result<TimeEncoder, ConfigError> {
        parse_epoch(&self.epoch)
            .map(TimeEncoder::new)
            .ok_or_else(|| ConfigError::invalid_option("time.epoch", format!(
                "'{}' is not a date (YYYY-MM-DD) or date and time (YYYY-MM-DD HH:MM:SS)", self.epoch
            )))
    }
}

/// Everything needed for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// CSV file with the station's data rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    /// Container file to write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
    /// Number of data rows to read from the input.
    pub row_count: usize,
    #[serde(default)]
    pub time: TimeConfig,
    pub station: StationDescriptor,
    #[serde(default)]
    pub metadata: GlobalMetadata,
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    pub variables: SchemaTable,
    #[serde(default)]
    pub crs: HorizontalDatum,
}

impl GeneratorConfig {
    /// Load a configuration file, applying any `STATIONNC_` environment overrides.
    pub fn load(path: &Path) -> error_stack::Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ReadError(path.to_path_buf()))
                .attach_printable("file does not exist");
        }
        Self::extract(Figment::new().merge(Toml::file(path)))
            .attach_printable_lazy(|| format!("while loading {}", path.display()))
    }

    /// Parse a configuration from a TOML string, applying any environment overrides.
    pub fn from_toml_str(s: &str) -> error_stack::Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Toml::string(s)))
    }

    fn extract(figment: Figment) -> error_stack::Result<Self, ConfigError> {
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// Check every constraint that can be checked without reading the input.
    pub fn validate(&self) -> error_stack::Result<(), SchemaError> {
        if self.row_count == 0 {
            log::warn!("row_count is 0; the output will contain no data rows");
        }
        self.station.validate()?;
        self.variables.validate(&self.instruments)?;
        Ok(())
    }

    /// Check the options that are not part of the station/variable schema.
    ///
    /// `format` is not checked here: it only selects the backend in the
    /// command line program, which reports formats the build cannot write.
    pub fn validate_options(&self) -> error_stack::Result<(), ConfigError> {
        self.time.encoder()?;
        self.metadata.validate()?;
        Ok(())
    }

    /// The file id: the output file's stem.
    pub fn file_id(&self) -> Option<String> {
        self.output.as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().to_string())
    }

    /// An example configuration, written by `csv2nc template`.
    pub fn example() -> Self {
        let met = "met".to_string();
        let variables = vec![
            VariableSchema::new("air_pressure", "air_pressure", "mbar", -999.0, 700.0, 1040.0).with_instrument(&met),
            VariableSchema::new("air_temperature", "air_temperature", "Celsius", -999.0, -10.0, 40.0).with_instrument(&met),
            VariableSchema::new("wind_speed", "wind_speed", "m s-1", -999.0, 0.0, 150.0)
                .with_instrument(&met)
                .with_source_column(SourceColumn::Name("wind_speed".to_string())),
            VariableSchema::new("wind_to_direction", "wind_to_direction", "degrees_true", -999.0, 0.0, 360.0)
                .with_instrument(&met),
        ];

        let metadata = GlobalMetadata {
            summary: "Hourly meteorological observations".to_string(),
            keywords: "ocean observing,sensors".to_string(),
            license: "Creative Commons (CC) 0".to_string(),
            ..Default::default()
        };

        Self {
            input: Some(PathBuf::from("station_2015_11_atm.csv")),
            output: Some(PathBuf::from("station_2015_11_atm.nc")),
            format: OutputFormat::Netcdf,
            row_count: 720,
            time: TimeConfig::default(),
            station: StationDescriptor {
                urn: "ioos:station:USF.COMPS:C10".to_string(),
                description: "C10: Navy-2".to_string(),
                naming_authority: "ioos:station:USF.COMPS".to_string(),
                url: "http://comps.marine.usf.edu/".to_string(),
                position: Position {
                    latitude: 27.169,
                    longitude: -82.926,
                    vertical: 3.0,
                    vertical_sense: VerticalSense::Up,
                    layout: PositionLayout::Station,
                    vertical_valid_range: None,
                    vertical_column: None,
                },
                platform: PlatformInfo { wmo_code: "42013".to_string(), ..Default::default() },
            },
            metadata,
            instruments: vec![Instrument {
                id: met,
                long_name: "RM Young 61202V, RM Young 41372VC/Analog 1 V Single".to_string(),
                comment: "Atmospheric probe and wind sensor".to_string(),
            }],
            variables: SchemaTable::new(variables),
            crs: HorizontalDatum::default(),
        }
    }
}

/// Write the example configuration to `path` as TOML.
pub fn write_template(path: &Path) -> error_stack::Result<(), ConfigError> {
    let body = toml::to_string_pretty(&GeneratorConfig::example())
        .change_context_lazy(|| ConfigError::TemplateError(path.to_path_buf()))?;
    let header = "# Example station configuration. See the config module documentation\n\
                  # for a description of every section.\n\n";
    std::fs::write(path, format!("{header}{body}"))
        .change_context_lazy(|| ConfigError::TemplateError(path.to_path_buf()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::C10_CONFIG_TOML;

    #[test]
    fn test_example_round_trips_through_toml() {
        let s = toml::to_string_pretty(&GeneratorConfig::example()).unwrap();
        let cfg = GeneratorConfig::from_toml_str(&s).unwrap();
        assert_eq!(cfg, GeneratorConfig::example());
        cfg.validate().unwrap();
        cfg.validate_options().unwrap();
    }

    #[test]
    fn test_output_format_does_not_affect_validation() {
        let mut cfg = GeneratorConfig::from_toml_str(C10_CONFIG_TOML).unwrap();
        for format in [OutputFormat::Netcdf, OutputFormat::Json] {
            cfg.format = format;
            cfg.validate_options().unwrap();
        }
    }

    #[test]
    fn test_parse_c10() {
        let cfg = GeneratorConfig::from_toml_str(C10_CONFIG_TOML).unwrap();
        assert_eq!(cfg.row_count, 3);
        assert_eq!(cfg.variables.len(), 2);
        assert_eq!(cfg.station.position.vertical_sense, VerticalSense::Up);
        assert_eq!(cfg.variables.get(0).map(|v| v.scale_factor), Some(1.0));
        assert_eq!(cfg.file_id().as_deref(), Some("c10_2015_11_atm"));
        cfg.validate().unwrap();
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let s = format!("{C10_CONFIG_TOML}\nunexpected = 1\n");
        assert!(GeneratorConfig::from_toml_str(&s).is_err());
    }

    #[test]
    fn test_missing_vertical_sense_rejected() {
        let s = C10_CONFIG_TOML.replace("vertical_sense = \"up\"\n", "");
        assert!(GeneratorConfig::from_toml_str(&s).is_err());
    }

    #[test]
    fn test_bad_epoch() {
        let cfg = TimeConfig { epoch: "yesterday".to_string() };
        assert!(cfg.encoder().is_err());
        let cfg = TimeConfig { epoch: "2000-01-01".to_string() };
        assert_eq!(cfg.encoder().unwrap().units(), "seconds since 2000-01-01 00:00:00 UTC");
    }

    #[test]
    fn test_fill_in_range_caught_by_validate() {
        let s = C10_CONFIG_TOML.replace("fill_value = -999.0\nvalid_min = 700.0", "fill_value = 800.0\nvalid_min = 700.0");
        let cfg = GeneratorConfig::from_toml_str(&s).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err.current_context(), SchemaError::FillInsideValidRange { .. }));
    }

    #[test]
    fn test_write_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.toml");
        write_template(&path).unwrap();
        let cfg = GeneratorConfig::load(&path).unwrap();
        assert_eq!(cfg.station.urn, "ioos:station:USF.COMPS:C10");
    }
}
