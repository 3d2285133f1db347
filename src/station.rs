//! Identity and fixed geometry of one observing station.
use error_stack::ResultExt;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::SourceColumn;

/// Fill value of the vertical coordinate.
pub const VERTICAL_FILL_VALUE: f64 = -999.0;

/// Which way the vertical coordinate increases.
///
/// Atmospheric stations record an altitude (positive up), oceanographic
/// stations a depth (positive down). This is always chosen in the
/// configuration, never inferred from the variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerticalSense {
    Up,
    Down,
}

impl VerticalSense {
    pub fn standard_name(&self) -> &'static str {
        match self {
            VerticalSense::Up => "altitude",
            VerticalSense::Down => "depth",
        }
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            VerticalSense::Up => "Altitude",
            VerticalSense::Down => "Depth",
        }
    }
}

/// How the fixed station position is laid out in the output.
///
/// `Station` stores latitude, longitude and vertical position once along the
/// station dimension. `PerRow` stores them along (time, station): latitude and
/// longitude repeat on every row, and the vertical position does too unless
/// it is read from an input column (e.g. the depth of a moored sensor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PositionLayout {
    #[default]
    Station,
    PerRow,
}

/// Geographic position of a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Vertical position in meters, interpreted according to `vertical_sense`.
    pub vertical: f64,
    pub vertical_sense: VerticalSense,
    #[serde(default)]
    pub layout: PositionLayout,
    /// Valid range written on the vertical coordinate. Defaults to the
    /// vertical position itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_valid_range: Option<[f64; 2]>,
    /// Input column holding the vertical position of each row. Only allowed
    /// with the `per_row` layout; `vertical` is then only the nominal value
    /// used for the file-level attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_column: Option<SourceColumn>,
}

impl Position {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(SchemaError::InvalidPosition(format!(
                "latitude {} is outside [-90, 90]", self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(SchemaError::InvalidPosition(format!(
                "longitude {} is outside [-180, 180]", self.longitude
            )));
        }
        if !self.vertical.is_finite() {
            return Err(SchemaError::InvalidPosition("vertical position is not finite".to_string()));
        }
        if let Some([vmin, vmax]) = self.vertical_valid_range {
            if vmin > vmax {
                return Err(SchemaError::InvalidPosition(format!(
                    "vertical valid range [{vmin}, {vmax}] is inverted"
                )));
            }
        }
        if self.vertical_column.is_some() && self.layout != PositionLayout::PerRow {
            return Err(SchemaError::InvalidPosition(
                "a vertical_column requires layout = \"per_row\"".to_string()
            ));
        }
        let (vmin, vmax) = self.vertical_range();
        if (vmin..=vmax).contains(&VERTICAL_FILL_VALUE) {
            return Err(SchemaError::InvalidPosition(format!(
                "vertical valid range [{vmin}, {vmax}] contains the fill value {VERTICAL_FILL_VALUE}"
            )));
        }
        Ok(())
    }

    pub fn vertical_range(&self) -> (f64, f64) {
        match self.vertical_valid_range {
            Some([vmin, vmax]) => (vmin, vmax),
            None => (self.vertical, self.vertical),
        }
    }
}

/// Platform identifiers carried on the `platform` variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PlatformInfo {
    pub comment: String,
    pub call_sign: String,
    pub ncei_code: String,
    pub wmo_code: String,
    pub imo_code: String,
}

/// One instrument that data variables may reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Instrument {
    /// Name of the zero-dimensional variable describing this instrument,
    /// also used as its stable identifier.
    pub id: String,
    /// Make and model, e.g. "YSI 6600".
    pub long_name: String,
    #[serde(default)]
    pub comment: String,
}

/// Horizontal datum described by the `crs` variable. Defaults to WGS84.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HorizontalDatum {
    pub epsg_code: String,
    pub semi_major_axis: f64,
    pub inverse_flattening: f64,
}

impl Default for HorizontalDatum {
    fn default() -> Self {
        Self {
            epsg_code: "EPSG:4326".to_string(),
            semi_major_axis: 6378137.0,
            inverse_flattening: 298.257223563,
        }
    }
}

/// Static description of one observing station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationDescriptor {
    /// Unique identifier, e.g. "ioos:station:USF.COMPS:C10"
    pub urn: String,
    /// Short human-readable description, e.g. "C10: Navy-2"
    pub description: String,
    /// Owning organization, e.g. "ioos:station:USF.COMPS"
    pub naming_authority: String,
    /// Station web page, written as the `references` of each data variable
    #[serde(default)]
    pub url: String,
    pub position: Position,
    #[serde(default)]
    pub platform: PlatformInfo,
}

impl StationDescriptor {
    pub fn validate(&self) -> error_stack::Result<(), SchemaError> {
        if self.urn.trim().is_empty() {
            return Err(SchemaError::MissingStationId.into());
        }
        self.position.validate()
            .attach_printable_lazy(|| format!("station {}", self.urn))?;
        Ok(())
    }

    /// Long name of the platform variable: the urn followed by the description.
    pub fn platform_long_name(&self) -> String {
        format!("{} {}", self.urn, self.description).trim().to_string()
    }
}
