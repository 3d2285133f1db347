//! Writes decoded samples into an already-defined container.
use error_stack::ResultExt;

use crate::builder::{LAT_VAR, LON_VAR, STATION_VAR, TIME_VAR, Z_VAR};
use crate::container::ContainerBackend;
use crate::decode::Sample;
use crate::error::ContainerError;
use crate::schema::SchemaTable;
use crate::station::{Position, PositionLayout};
use crate::time::TimeEncoder;

/// Value stored in the station identity variable.
pub const STATION_INDEX_VALUE: f64 = 1.0;

/// Per-variable counts collected while writing.
#[derive(Debug, Clone, PartialEq, Eq, tabled::Tabled)]
pub struct VariableSummary {
    #[tabled(rename = "Variable")]
    pub name: String,
    #[tabled(rename = "Fill fallbacks")]
    pub fallbacks: usize,
    #[tabled(rename = "Out of valid range")]
    pub out_of_range: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    pub variables: Vec<VariableSummary>,
}

/// Owns the row cursor and writes each sample at the next row.
pub struct SeriesWriter<'a> {
    schema: &'a SchemaTable,
    position: &'a Position,
    time: TimeEncoder,
    cursor: usize,
    fallbacks: Vec<usize>,
    out_of_range: Vec<usize>,
}

impl<'a> SeriesWriter<'a> {
    pub fn new(schema: &'a SchemaTable, position: &'a Position, time: TimeEncoder) -> Self {
        Self {
            schema,
            position,
            time,
            cursor: 0,
            fallbacks: vec![0; schema.len()],
            out_of_range: vec![0; schema.len()],
        }
    }

    /// Number of rows written so far; also the index the next row goes to.
    pub fn rows_written(&self) -> usize {
        self.cursor
    }

    /// Write the values that do not depend on the rows: the station index
    /// and, in the station position layout, the position itself.
    pub fn write_station<B: ContainerBackend>(&mut self, nc: &mut B) -> error_stack::Result<(), ContainerError> {
        nc.write_value(STATION_VAR, &[0], STATION_INDEX_VALUE)?;
        if self.position.layout == PositionLayout::Station {
            self.write_position(nc, &[0], self.position.vertical)?;
        }
        Ok(())
    }

    /// Write `sample` as the next row and advance the cursor.
    pub fn append<B: ContainerBackend>(&mut self, nc: &mut B, sample: &Sample) -> error_stack::Result<(), ContainerError> {
        let row = self.cursor;
        self.write_row(nc, row, sample)
            .attach_printable_lazy(|| format!("writing data row {}", row + 1))?;

        for &i in sample.fallbacks.iter() {
            self.fallbacks[i] += 1;
        }
        for (i, (var, &value)) in self.schema.iter().zip(sample.values.iter()).enumerate() {
            if var.is_out_of_range(value) {
                log::debug!("Row {}: {} = {value} is outside its valid range [{}, {}]", row + 1, var.name, var.valid_min, var.valid_max);
                self.out_of_range[i] += 1;
            }
        }

        self.cursor += 1;
        Ok(())
    }

    fn write_row<B: ContainerBackend>(&self, nc: &mut B, row: usize, sample: &Sample) -> error_stack::Result<(), ContainerError> {
        if sample.values.len() != self.schema.len() {
            return Err(ContainerError::write_error(TIME_VAR, &[row]))
                .attach_printable_lazy(|| format!(
                    "sample has {} values but the schema has {} variables", sample.values.len(), self.schema.len()
                ));
        }

        let t = self.time.encode(sample.timestamp);
        nc.write_value(TIME_VAR, &[row], t as f64)?;

        for (var, &value) in self.schema.iter().zip(sample.values.iter()) {
            nc.write_value(&var.name, &[row, 0], var.pack(value))?;
        }

        if self.position.layout == PositionLayout::PerRow {
            let z = sample.vertical.unwrap_or(self.position.vertical);
            self.write_position(nc, &[row, 0], z)?;
        }
        Ok(())
    }

    fn write_position<B: ContainerBackend>(&self, nc: &mut B, index: &[usize], vertical: f64) -> error_stack::Result<(), ContainerError> {
        nc.write_value(LAT_VAR, index, self.position.latitude)?;
        nc.write_value(LON_VAR, index, self.position.longitude)?;
        nc.write_value(Z_VAR, index, vertical)?;
        Ok(())
    }

    pub fn summary(&self) -> WriteSummary {
        let variables = self.schema.iter()
            .zip(self.fallbacks.iter().zip(self.out_of_range.iter()))
            .map(|(var, (&fallbacks, &out_of_range))| VariableSummary {
                name: var.name.clone(), fallbacks, out_of_range
            }).collect();
        WriteSummary { rows: self.cursor, variables }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, Utc};

    use super::*;
    use crate::builder::ContainerBuilder;
    use crate::container::MemoryBackend;
    use crate::test_utils::c10_config;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2015, 11, 1).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn sample(h: u32, values: Vec<f64>) -> Sample {
        Sample { timestamp: ts(h), values, fallbacks: vec![], vertical: None }
    }

    #[test]
    fn test_rows_written_in_order() {
        let config = c10_config();
        let mut mem = MemoryBackend::in_memory();
        ContainerBuilder::new(&config, TimeEncoder::unix(), "x", Utc::now()).build(&mut mem).unwrap();

        let mut writer = SeriesWriter::new(&config.variables, &config.station.position, TimeEncoder::unix());
        writer.write_station(&mut mem).unwrap();
        writer.append(&mut mem, &sample(0, vec![1013.2, 21.5])).unwrap();
        writer.append(&mut mem, &Sample { fallbacks: vec![0], ..sample(1, vec![-999.0, 22.0]) }).unwrap();
        writer.append(&mut mem, &sample(2, vec![1050.0, 21.8])).unwrap();

        assert_eq!(writer.rows_written(), 3);
        assert_eq!(mem.values(TIME_VAR).unwrap().into_raw_vec(), vec![1446336000.0, 1446339600.0, 1446343200.0]);
        assert_eq!(mem.values("air_pressure").unwrap().into_raw_vec(), vec![1013.2, -999.0, 1050.0]);
        assert_eq!(mem.values(STATION_VAR).unwrap().into_raw_vec(), vec![1.0]);
        assert_eq!(mem.values(LAT_VAR).unwrap().into_raw_vec(), vec![27.169]);

        let summary = writer.summary();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.variables[0], VariableSummary { name: "air_pressure".to_string(), fallbacks: 1, out_of_range: 1 });
        assert_eq!(summary.variables[1].out_of_range, 0);
    }

    #[test]
    fn test_rewriting_a_row_is_idempotent() {
        let config = c10_config();
        let mut mem = MemoryBackend::in_memory();
        ContainerBuilder::new(&config, TimeEncoder::unix(), "x", Utc::now()).build(&mut mem).unwrap();
        let writer = SeriesWriter::new(&config.variables, &config.station.position, TimeEncoder::unix());

        let s = sample(0, vec![1013.2, 21.5]);
        writer.write_row(&mut mem, 0, &s).unwrap();
        let once = mem.clone();
        writer.write_row(&mut mem, 0, &s).unwrap();
        assert_eq!(mem, once);
    }

    #[test]
    fn test_per_row_position() {
        let mut config = c10_config();
        config.station.position.layout = PositionLayout::PerRow;
        let mut mem = MemoryBackend::in_memory();
        ContainerBuilder::new(&config, TimeEncoder::unix(), "x", Utc::now()).build(&mut mem).unwrap();

        let mut writer = SeriesWriter::new(&config.variables, &config.station.position, TimeEncoder::unix());
        writer.write_station(&mut mem).unwrap();
        writer.append(&mut mem, &sample(0, vec![1013.2, 21.5])).unwrap();
        writer.append(&mut mem, &sample(1, vec![1013.0, 21.0])).unwrap();
        assert_eq!(mem.values(Z_VAR).unwrap().into_raw_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_per_row_vertical_from_samples() {
        let mut config = c10_config();
        config.station.position.layout = PositionLayout::PerRow;
        let mut mem = MemoryBackend::in_memory();
        ContainerBuilder::new(&config, TimeEncoder::unix(), "x", Utc::now()).build(&mut mem).unwrap();

        let mut writer = SeriesWriter::new(&config.variables, &config.station.position, TimeEncoder::unix());
        writer.write_station(&mut mem).unwrap();
        writer.append(&mut mem, &Sample { vertical: Some(2.5), ..sample(0, vec![1013.2, 21.5]) }).unwrap();
        writer.append(&mut mem, &Sample { vertical: Some(-999.0), ..sample(1, vec![1013.0, 21.0]) }).unwrap();
        assert_eq!(mem.values(Z_VAR).unwrap().into_raw_vec(), vec![2.5, -999.0]);
        assert_eq!(mem.values(LAT_VAR).unwrap().into_raw_vec(), vec![27.169, 27.169]);
    }

    #[test]
    fn test_sample_width_must_match_schema() {
        let config = c10_config();
        let mut mem = MemoryBackend::in_memory();
        ContainerBuilder::new(&config, TimeEncoder::unix(), "x", Utc::now()).build(&mut mem).unwrap();
        let mut writer = SeriesWriter::new(&config.variables, &config.station.position, TimeEncoder::unix());
        assert!(writer.append(&mut mem, &sample(0, vec![1013.2])).is_err());
        assert_eq!(writer.rows_written(), 0);
    }
}
