//! Defines the complete structure of a timeSeries container.
//!
//! Everything (dimensions, variables, and attributes) is defined here, once,
//! before the series writer puts any data in the file.
use chrono::{DateTime, Utc};
use error_stack::ResultExt;

use crate::config::GeneratorConfig;
use crate::container::{AttrValue, ContainerBackend, DimLength};
use crate::error::{ContainerError, GenerationError};
use crate::schema::{StorageKind, VariableSchema};
use crate::station::{Instrument, PositionLayout, VERTICAL_FILL_VALUE};
use crate::time::TimeEncoder;

pub const TIME_DIM: &str = "time";
pub const STATION_DIM: &str = "station";
pub const STATION_VAR: &str = "station";
pub const TIME_VAR: &str = "time";
pub const LAT_VAR: &str = "lat";
pub const LON_VAR: &str = "lon";
pub const Z_VAR: &str = "z";
pub const PLATFORM_VAR: &str = "platform";
pub const CRS_VAR: &str = "crs";

/// The definition steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BuildStep {
    Dimensions,
    GlobalAttributes,
    StationVariable,
    TimeCoordinate,
    PositionCoordinates,
    Instruments,
    Platform,
    DataVariables,
    Crs,
}

pub struct ContainerBuilder<'a> {
    config: &'a GeneratorConfig,
    time: TimeEncoder,
    file_id: &'a str,
    generated_at: DateTime<Utc>,
}

impl<'a> ContainerBuilder<'a> {
    /// `config` must already have been validated.
    pub fn new(config: &'a GeneratorConfig, time: TimeEncoder, file_id: &'a str, generated_at: DateTime<Utc>) -> Self {
        Self { config, time, file_id, generated_at }
    }

    /// Instruments that at least one data variable references, in order of first use.
    pub fn used_instruments(&self) -> Vec<&'a Instrument> {
        let config: &'a GeneratorConfig = self.config;
        config.variables.referenced_instruments()
            .into_iter()
            .filter_map(|id| config.instruments.iter().find(|i| i.id == id))
            .collect()
    }

    /// Dimensions of the lat/lon/z variables for the configured layout.
    pub fn position_dims(&self) -> &'static [&'static str] {
        match self.config.station.position.layout {
            PositionLayout::Station => &[STATION_DIM],
            PositionLayout::PerRow => &[TIME_DIM, STATION_DIM],
        }
    }

    /// Define everything in `nc`. On failure the error names the step that failed.
    pub fn build<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), GenerationError> {
        log::debug!("Defining container '{}' for {} rows", self.file_id, self.config.row_count);
        self.define_dimensions(nc).change_context(GenerationError::build_failure(BuildStep::Dimensions))?;
        self.put_global_attributes(nc).change_context(GenerationError::build_failure(BuildStep::GlobalAttributes))?;
        self.define_station(nc).change_context(GenerationError::build_failure(BuildStep::StationVariable))?;
        self.define_time(nc).change_context(GenerationError::build_failure(BuildStep::TimeCoordinate))?;
        self.define_position(nc).change_context(GenerationError::build_failure(BuildStep::PositionCoordinates))?;
        self.define_instruments(nc).change_context(GenerationError::build_failure(BuildStep::Instruments))?;
        self.define_platform(nc).change_context(GenerationError::build_failure(BuildStep::Platform))?;
        for var in self.config.variables.iter() {
            self.define_data_variable(nc, var)
                .change_context(GenerationError::build_failure(BuildStep::DataVariables))
                .attach_printable_lazy(|| format!("while defining variable '{}'", var.name))?;
        }
        self.define_crs(nc).change_context(GenerationError::build_failure(BuildStep::Crs))?;
        Ok(())
    }

    fn define_dimensions<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        nc.define_dimension(TIME_DIM, DimLength::Unlimited)?;
        nc.define_dimension(STATION_DIM, DimLength::Fixed(1))?;
        Ok(())
    }

    fn put_global_attributes<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        let instruments = self.used_instruments();
        let attrs = self.config.metadata.global_attributes(&self.config.station, &instruments, self.file_id, self.generated_at);
        for (key, value) in attrs {
            nc.put_global_attribute(&key, value)?;
        }
        Ok(())
    }

    fn define_station<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        nc.define_variable(STATION_VAR, StorageKind::Integer, &[STATION_DIM], None)?;
        put_attributes(nc, STATION_VAR, [
            ("long_name", (&self.config.station.description).into()),
            ("cf_role", "timeseries_id".into()),
        ])
    }

    fn define_time<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        nc.define_variable(TIME_VAR, StorageKind::Float, &[TIME_DIM], None)?;
        put_attributes(nc, TIME_VAR, [
            ("long_name", "Time".into()),
            ("standard_name", "time".into()),
            ("units", self.time.units().into()),
            ("calendar", self.time.calendar().into()),
            ("axis", "T".into()),
        ])
    }

    fn define_position<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        let dims = self.position_dims();
        let pos = &self.config.station.position;

        nc.define_variable(LAT_VAR, StorageKind::Float, dims, None)?;
        put_attributes(nc, LAT_VAR, [
            ("long_name", "Latitude".into()),
            ("standard_name", "latitude".into()),
            ("units", "degrees_north".into()),
            ("axis", "Y".into()),
            ("valid_min", (-90.0).into()),
            ("valid_max", 90.0.into()),
        ])?;

        nc.define_variable(LON_VAR, StorageKind::Float, dims, None)?;
        put_attributes(nc, LON_VAR, [
            ("long_name", "Longitude".into()),
            ("standard_name", "longitude".into()),
            ("units", "degrees_east".into()),
            ("axis", "X".into()),
            ("valid_min", (-180.0).into()),
            ("valid_max", 180.0.into()),
        ])?;

        let (vmin, vmax) = pos.vertical_range();
        nc.define_variable(Z_VAR, StorageKind::Float, dims, Some(VERTICAL_FILL_VALUE))?;
        put_attributes(nc, Z_VAR, [
            ("long_name", pos.vertical_sense.long_name().into()),
            ("standard_name", pos.vertical_sense.standard_name().into()),
            ("units", "m".into()),
            ("axis", "Z".into()),
            ("positive", pos.vertical_sense.to_string().into()),
            ("valid_min", vmin.into()),
            ("valid_max", vmax.into()),
        ])
    }

    fn define_instruments<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        for instr in self.used_instruments() {
            nc.define_variable(&instr.id, StorageKind::Integer, &[], None)?;
            put_attributes(nc, &instr.id, [
                ("long_name", (&instr.long_name).into()),
                ("comment", (&instr.comment).into()),
                ("id", (&instr.id).into()),
            ])?;
        }

        for instr in self.config.instruments.iter() {
            if self.config.variables.iter().all(|v| v.instrument.as_deref() != Some(instr.id.as_str())) {
                log::warn!("Instrument '{}' is not referenced by any variable and will not be written", instr.id);
            }
        }
        Ok(())
    }

    fn define_platform<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        let station = &self.config.station;
        let platform = &station.platform;
        nc.define_variable(PLATFORM_VAR, StorageKind::Integer, &[], None)?;
        put_attributes(nc, PLATFORM_VAR, [
            ("long_name", station.platform_long_name().into()),
            ("ioos_code", (&station.urn).into()),
            ("comment", (&platform.comment).into()),
            ("call_sign", (&platform.call_sign).into()),
            ("ncei_code", (&platform.ncei_code).into()),
            ("wmo_code", (&platform.wmo_code).into()),
            ("imo_code", (&platform.imo_code).into()),
        ])
    }

    fn define_data_variable<B: ContainerBackend>(&self, nc: &mut B, var: &VariableSchema) -> error_stack::Result<(), ContainerError> {
        let kind = var.kind;
        nc.define_variable(&var.name, kind, &[TIME_DIM, STATION_DIM], Some(var.fill_value))?;

        let (packed_min, packed_max) = var.packed_valid_range();
        let ancillary = match &var.instrument {
            Some(instr) => format!("{instr} {PLATFORM_VAR}"),
            None => PLATFORM_VAR.to_string(),
        };

        put_attributes(nc, &var.name, [
            ("long_name", var.long_name().into()),
            ("standard_name", (&var.standard_name).into()),
            ("ncei_name", var.ncei_name().into()),
            ("units", (&var.units).into()),
            ("missing_value", AttrValue::for_kind(kind, var.fill_value)),
            ("valid_min", AttrValue::for_kind(kind, packed_min)),
            ("valid_max", AttrValue::for_kind(kind, packed_max)),
            ("scale_factor", var.scale_factor.into()),
            ("add_offset", var.add_offset.into()),
            ("coordinates", format!("{TIME_VAR} {LAT_VAR} {LON_VAR} {Z_VAR}").into()),
            ("coverage_content_type", (&var.coverage_content_type).into()),
            ("grid_mapping", CRS_VAR.into()),
            ("source", (&var.source).into()),
            ("references", (&self.config.station.url).into()),
            ("cell_methods", "time: point lon: point lat: point".into()),
            ("ancillary_variables", ancillary.into()),
            ("platform", PLATFORM_VAR.into()),
        ])?;

        if let Some(instr) = &var.instrument {
            nc.put_variable_attribute(&var.name, "instrument", instr.into())?;
        }
        nc.put_variable_attribute(&var.name, "comment", (&var.comment).into())?;
        Ok(())
    }

    fn define_crs<B: ContainerBackend>(&self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        let crs = &self.config.crs;
        nc.define_variable(CRS_VAR, StorageKind::Integer, &[], None)?;
        put_attributes(nc, CRS_VAR, [
            ("grid_mapping_name", "latitude_longitude".into()),
            ("epsg_code", (&crs.epsg_code).into()),
            ("semi_major_axis", crs.semi_major_axis.into()),
            ("inverse_flattening", crs.inverse_flattening.into()),
        ])
    }
}

fn put_attributes<B: ContainerBackend, const N: usize>(nc: &mut B, var: &str, attrs: [(&str, AttrValue); N])
-> error_stack::Result<(), ContainerError> {
    for (key, value) in attrs {
        nc.put_variable_attribute(var, key, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::container::MemoryBackend;
    use crate::schema::SchemaTable;
    use crate::test_utils::{c10_config, pressure_schema};

    fn build(config: &GeneratorConfig) -> MemoryBackend {
        let t = Utc.with_ymd_and_hms(2016, 2, 16, 0, 0, 0).unwrap();
        let builder = ContainerBuilder::new(config, TimeEncoder::unix(), "c10_2015_11_atm", t);
        let mut mem = MemoryBackend::in_memory();
        builder.build(&mut mem).unwrap();
        mem
    }

    #[test]
    fn test_defines_timeseries_structure() {
        let config = c10_config();
        let mem = build(&config);

        assert_eq!(mem.is_unlimited(TIME_DIM), Some(true));
        assert_eq!(mem.dimension_len(STATION_DIM), Some(1));

        let names: Vec<&str> = mem.variable_names().collect();
        assert_eq!(names, vec![
            "station", "time", "lat", "lon", "z", "met", "platform", "air_pressure", "air_temperature", "crs"
        ]);

        let station = mem.variable(STATION_VAR).unwrap();
        assert_eq!(station.attribute("cf_role").and_then(|a| a.as_str()), Some("timeseries_id"));
        assert_eq!(station.attribute("long_name").and_then(|a| a.as_str()), Some("C10: Navy-2"));

        let time = mem.variable(TIME_VAR).unwrap();
        assert_eq!(time.dims(), &["time".to_string()]);
        assert_eq!(time.attribute("units").and_then(|a| a.as_str()), Some("seconds since 1970-01-01 00:00:00 UTC"));
        assert_eq!(time.attribute("calendar").and_then(|a| a.as_str()), Some("gregorian"));

        let z = mem.variable(Z_VAR).unwrap();
        assert_eq!(z.attribute("positive").and_then(|a| a.as_str()), Some("up"));
        assert_eq!(z.attribute("standard_name").and_then(|a| a.as_str()), Some("altitude"));

        assert_eq!(mem.global_attribute("featureType").and_then(|a| a.as_str()), Some("timeSeries"));
        assert_eq!(mem.global_attribute("id").and_then(|a| a.as_str()), Some("c10_2015_11_atm"));
    }

    #[test]
    fn test_data_variable_attributes() {
        let config = c10_config();
        let mem = build(&config);
        let p = mem.variable("air_pressure").unwrap();
        assert_eq!(p.dims(), &["time".to_string(), "station".to_string()]);
        assert_eq!(p.attribute("_FillValue"), Some(&AttrValue::Double(-999.0)));
        assert_eq!(p.attribute("missing_value"), Some(&AttrValue::Double(-999.0)));
        assert_eq!(p.attribute("valid_min"), Some(&AttrValue::Double(700.0)));
        assert_eq!(p.attribute("valid_max"), Some(&AttrValue::Double(1040.0)));
        assert_eq!(p.attribute("long_name").and_then(|a| a.as_str()), Some("air pressure"));
        assert_eq!(p.attribute("coordinates").and_then(|a| a.as_str()), Some("time lat lon z"));
        assert_eq!(p.attribute("ancillary_variables").and_then(|a| a.as_str()), Some("met platform"));
        assert_eq!(p.attribute("instrument").and_then(|a| a.as_str()), Some("met"));
        assert_eq!(p.attribute("references").and_then(|a| a.as_str()), Some("http://comps.marine.usf.edu/"));
    }

    #[test]
    fn test_integer_variable_attributes_match_storage() {
        let mut config = c10_config();
        config.variables = SchemaTable::new(vec![
            pressure_schema().with_kind(StorageKind::Integer).with_encoding(0.5, 1000.0)
        ]);
        let mem = build(&config);
        let p = mem.variable("air_pressure").unwrap();
        assert_eq!(p.kind(), StorageKind::Integer);
        assert_eq!(p.attribute("_FillValue"), Some(&AttrValue::Int(-999)));
        assert_eq!(p.attribute("valid_min"), Some(&AttrValue::Int(-600)));
        assert_eq!(p.attribute("valid_max"), Some(&AttrValue::Int(80)));
        assert_eq!(p.attribute("scale_factor"), Some(&AttrValue::Double(0.5)));
        // no instruments referenced, so none defined
        assert!(mem.variable("met").is_none());
        assert_eq!(p.attribute("ancillary_variables").and_then(|a| a.as_str()), Some("platform"));
    }

    #[test]
    fn test_negative_scale_writes_ordered_valid_range() {
        let mut config = c10_config();
        config.variables = SchemaTable::new(vec![pressure_schema().with_encoding(-1.0, 2000.0)]);
        config.variables.validate(&config.instruments).unwrap();
        let mem = build(&config);
        let p = mem.variable("air_pressure").unwrap();
        assert_eq!(p.attribute("valid_min"), Some(&AttrValue::Double(960.0)));
        assert_eq!(p.attribute("valid_max"), Some(&AttrValue::Double(1300.0)));
    }

    #[test]
    fn test_per_row_layout() {
        let mut config = c10_config();
        config.station.position.layout = PositionLayout::PerRow;
        let mem = build(&config);
        assert_eq!(mem.variable(LAT_VAR).unwrap().dims(), &["time".to_string(), "station".to_string()]);
    }

    #[test]
    fn test_build_failure_names_step() {
        let config = c10_config();
        let t = Utc.with_ymd_and_hms(2016, 2, 16, 0, 0, 0).unwrap();
        let builder = ContainerBuilder::new(&config, TimeEncoder::unix(), "x", t);
        let mut mem = MemoryBackend::in_memory();
        mem.define_dimension(STATION_DIM, DimLength::Fixed(1)).unwrap();
        let err = builder.build(&mut mem).unwrap_err();
        assert!(matches!(err.current_context(), GenerationError::ContainerBuildFailure(step) if step == "dimensions"));
    }
}
