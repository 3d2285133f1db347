//! The ordered table of variables recorded for a station.
use std::collections::HashSet;

use error_stack::ResultExt;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::station::Instrument;

/// Number of leading fields in each input record that hold the timestamp
/// (date, then time of day).
pub const TIMESTAMP_FIELDS: usize = 2;

/// Variable names the container builder defines itself; a data variable
/// may not reuse them.
pub const RESERVED_NAMES: &[&str] = &["time", "station", "lat", "lon", "z", "platform", "crs"];

/// Numeric type used to store a variable in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StorageKind {
    Integer,
    #[default]
    Float,
}

/// Where in the input record a variable's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceColumn {
    /// 0-based field index in the record; indices 0 and 1 are the date and time.
    Index(usize),
    /// Name of the column in the input header line.
    Name(String),
}

impl SourceColumn {
    /// The record field this column refers to. Names need the header line.
    pub fn resolve(&self, header: Option<&[String]>) -> Option<usize> {
        match self {
            SourceColumn::Index(i) => Some(*i),
            SourceColumn::Name(name) => header
                .and_then(|h| h.iter().position(|c| c.trim() == name)),
        }
    }
}

impl std::fmt::Display for SourceColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceColumn::Index(i) => write!(f, "#{i}"),
            SourceColumn::Name(n) => write!(f, "{n}"),
        }
    }
}

/// One physical quantity to record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableSchema {
    /// Output variable name, e.g. "air_pressure"
    pub name: String,
    /// CF standard name, e.g. "air_pressure"
    pub standard_name: String,
    /// Defaults to the standard name with underscores replaced by spaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    /// Defaults to the standard name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncei_name: Option<String>,
    pub units: String,
    #[serde(default)]
    pub kind: StorageKind,
    pub fill_value: f64,
    pub valid_min: f64,
    pub valid_max: f64,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    #[serde(default)]
    pub add_offset: f64,
    /// Defaults to the field following the previous variable's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<SourceColumn>,
    /// `id` of the instrument that measured this variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(default = "default_coverage_content_type")]
    pub coverage_content_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub comment: String,
}

fn default_scale_factor() -> f64 {
    1.0
}

fn default_coverage_content_type() -> String {
    "physicalMeasurement".to_string()
}

impl VariableSchema {
    /// Create a float variable with identity encoding, its source column
    /// left to the table order.
    pub fn new(name: &str, standard_name: &str, units: &str, fill_value: f64, valid_min: f64, valid_max: f64) -> Self {
        Self {
            name: name.to_string(),
            standard_name: standard_name.to_string(),
            long_name: None,
            ncei_name: None,
            units: units.to_string(),
            kind: StorageKind::Float,
            fill_value,
            valid_min,
            valid_max,
            scale_factor: default_scale_factor(),
            add_offset: 0.0,
            source_column: None,
            instrument: None,
            coverage_content_type: default_coverage_content_type(),
            source: String::new(),
            comment: String::new(),
        }
    }

    pub fn with_instrument(mut self, instrument: &str) -> Self {
        self.instrument = Some(instrument.to_string());
        self
    }

    pub fn with_source_column(mut self, column: SourceColumn) -> Self {
        self.source_column = Some(column);
        self
    }

    pub fn with_kind(mut self, kind: StorageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_encoding(mut self, scale_factor: f64, add_offset: f64) -> Self {
        self.scale_factor = scale_factor;
        self.add_offset = add_offset;
        self
    }

    pub fn long_name(&self) -> String {
        self.long_name.clone()
            .unwrap_or_else(|| self.standard_name.replace('_', " "))
    }

    pub fn ncei_name(&self) -> &str {
        self.ncei_name.as_deref().unwrap_or(&self.standard_name)
    }

    /// Check this variable's own invariants (not those involving other variables).
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.valid_min > self.valid_max {
            return Err(SchemaError::InvertedValidRange {
                name: self.name.clone(), min: self.valid_min, max: self.valid_max
            });
        }

        if (self.valid_min..=self.valid_max).contains(&self.fill_value) {
            return Err(SchemaError::FillInsideValidRange {
                name: self.name.clone(), fill: self.fill_value, min: self.valid_min, max: self.valid_max
            });
        }

        if self.scale_factor == 0.0 || !self.scale_factor.is_finite() {
            return Err(SchemaError::ZeroScaleFactor { name: self.name.clone() });
        }

        if self.kind == StorageKind::Integer && (self.fill_value.fract() != 0.0 || !fits_i32(self.fill_value)) {
            return Err(SchemaError::NonIntegerFill { name: self.name.clone(), fill: self.fill_value });
        }

        // `_FillValue` is stored unpacked, so it must also stay clear of every stored reading.
        let (pmin, pmax) = self.packed_valid_range();
        if (pmin..=pmax).contains(&self.fill_value) {
            return Err(SchemaError::FillInsidePackedRange {
                name: self.name.clone(), fill: self.fill_value, min: pmin, max: pmax
            });
        }

        Ok(())
    }

    /// The valid range in storage space, lowest value first. A negative
    /// scale factor swaps the packed ends of the range.
    pub fn packed_valid_range(&self) -> (f64, f64) {
        let a = self.pack_unchecked(self.valid_min);
        let b = self.pack_unchecked(self.valid_max);
        (a.min(b), a.max(b))
    }

    /// Is this value the variable's fill value?
    pub fn is_fill(&self, value: f64) -> bool {
        value == self.fill_value
    }

    /// Is this value outside the descriptive valid range? Fill values are
    /// not counted.
    pub fn is_out_of_range(&self, value: f64) -> bool {
        !self.is_fill(value) && !(self.valid_min..=self.valid_max).contains(&value)
    }

    /// Apply the linear encoding to a raw value, giving the value to store.
    ///
    /// Fill values pass through unchanged. Integer storage rounds half away
    /// from zero after unpacking the offset and scale.
    pub fn pack(&self, value: f64) -> f64 {
        if self.is_fill(value) {
            return value;
        }
        self.pack_unchecked(value)
    }

    fn pack_unchecked(&self, value: f64) -> f64 {
        let packed = (value - self.add_offset) / self.scale_factor;
        match self.kind {
            StorageKind::Float => packed,
            StorageKind::Integer => packed.round(),
        }
    }
}

pub(crate) fn fits_i32(v: f64) -> bool {
    v >= i32::MIN as f64 && v <= i32::MAX as f64
}

/// The ordered variable definitions for one output file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaTable {
    variables: Vec<VariableSchema>,
}

impl SchemaTable {
    pub fn new(variables: Vec<VariableSchema>) -> Self {
        Self { variables }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VariableSchema> {
        self.variables.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&VariableSchema> {
        self.variables.get(idx)
    }

    /// Check every per-variable invariant plus the cross-table ones: names are
    /// unique, do not collide with builder-defined variables, and every
    /// instrument reference resolves.
    pub fn validate(&self, instruments: &[Instrument]) -> error_stack::Result<(), SchemaError> {
        if self.variables.is_empty() {
            return Err(SchemaError::EmptySchema.into());
        }

        for var in self.variables.iter() {
            var.validate()?;
        }

        let instrument_ids: HashSet<&str> = instruments.iter().map(|i| i.id.as_str()).collect();
        let all_names = self.variables.iter().map(|v| v.name.as_str())
            .chain(RESERVED_NAMES.iter().copied())
            .chain(instruments.iter().map(|i| i.id.as_str()));
        if let Some(dup) = all_names.duplicates().next() {
            return Err(SchemaError::DuplicateName(dup.to_string()).into());
        }

        for var in self.variables.iter() {
            if let Some(instr) = &var.instrument {
                if !instrument_ids.contains(instr.as_str()) {
                    return Err(SchemaError::UnknownInstrument {
                        variable: var.name.clone(),
                        instrument: instr.clone()
                    }).attach_printable_lazy(|| format!(
                        "defined instruments are: {}", instrument_ids.iter().sorted().join(", ")
                    ));
                }
            }
        }

        Ok(())
    }

    /// Instrument ids referenced by at least one variable, in first-use order.
    pub fn referenced_instruments(&self) -> Vec<&str> {
        self.variables.iter()
            .filter_map(|v| v.instrument.as_deref())
            .unique()
            .collect()
    }

    /// Map each variable to the record field it reads from.
    ///
    /// Variables without an explicit source column take the field after the
    /// previous variable's (the first one takes the field after the date and
    /// time). Named columns are looked up in `header`.
    pub fn resolve_columns(&self, header: Option<&[String]>) -> Result<Vec<usize>, SchemaError> {
        let mut columns = Vec::with_capacity(self.variables.len());
        let mut next = TIMESTAMP_FIELDS;
        for var in self.variables.iter() {
            let idx = match &var.source_column {
                None => next,
                Some(col) => col.resolve(header)
                    .ok_or_else(|| SchemaError::UnknownColumn {
                        variable: var.name.clone(),
                        column: col.to_string()
                    })?,
            };

            if idx < TIMESTAMP_FIELDS {
                return Err(SchemaError::ReservedColumn { variable: var.name.clone(), index: idx });
            }
            columns.push(idx);
            next = idx + 1;
        }
        Ok(columns)
    }
}

impl<'a> IntoIterator for &'a SchemaTable {
    type Item = &'a VariableSchema;
    type IntoIter = std::slice::Iter<'a, VariableSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.variables.iter()
    }
}
