//! The structured scientific container the encoder writes into.
//!
//! The builder and series writer only ever talk to a [`ContainerBackend`];
//! two backends are provided. [`MemoryBackend`] keeps everything in memory and
//! serializes it to JSON when closed, which is what the tests use.
//! `NetcdfBackend` (behind the `netcdf` feature) writes a netCDF-4 classic
//! model file.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ContainerError;
use crate::schema::StorageKind;

mod memory;
#[cfg(feature = "netcdf")]
mod netcdf_backend;

pub use memory::{MemoryBackend, MemoryVariable};
#[cfg(feature = "netcdf")]
pub use netcdf_backend::NetcdfBackend;

/// netCDF's default fill for doubles, used when a variable declares no fill.
pub const DEFAULT_FILL_F64: f64 = 9.969209968386869e36;
/// netCDF's default fill for 32-bit ints.
pub const DEFAULT_FILL_I32: i32 = -2147483647;

/// Length of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimLength {
    Fixed(usize),
    Unlimited,
}

/// An attribute value. Numeric attributes describing a variable's data
/// (fills, valid ranges) should match the variable's storage kind; use
/// [`AttrValue::for_kind`] for those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Int(i32),
    Double(f64),
}

impl AttrValue {
    /// Make a numeric attribute with the same type as a variable of `kind`.
    pub fn for_kind(kind: StorageKind, value: f64) -> Self {
        match kind {
            StorageKind::Float => Self::Double(value),
            StorageKind::Integer => Self::Int(value.round() as i32),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Text(_) => None,
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Double(v) => Some(*v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for AttrValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

/// Low-level operations of a structured scientific container.
///
/// Implementations must reject any dimension or variable definition made
/// after the first data write, since the classic data model does not allow
/// the structure to change once data is in the file.
pub trait ContainerBackend: Sized {
    /// Create a new, empty container at `path`, replacing any existing file.
    fn create(path: &Path) -> error_stack::Result<Self, ContainerError>;

    fn define_dimension(&mut self, name: &str, len: DimLength) -> error_stack::Result<(), ContainerError>;

    /// Define a variable over the named dimensions (an empty slice makes it
    /// zero-dimensional). `fill` becomes its `_FillValue`.
    fn define_variable(&mut self, name: &str, kind: StorageKind, dims: &[&str], fill: Option<f64>)
    -> error_stack::Result<(), ContainerError>;

    fn put_global_attribute(&mut self, key: &str, value: AttrValue) -> error_stack::Result<(), ContainerError>;

    fn put_variable_attribute(&mut self, var: &str, key: &str, value: AttrValue) -> error_stack::Result<(), ContainerError>;

    /// Write one value at `index` (one entry per dimension of the variable).
    /// Integer variables receive the value rounded half away from zero.
    fn write_value(&mut self, var: &str, index: &[usize], value: f64) -> error_stack::Result<(), ContainerError>;

    /// Flush and close the container.
    fn close(self) -> error_stack::Result<(), ContainerError>;
}

/// Output formats the generator can write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Netcdf,
    Json,
}

impl OutputFormat {
    /// Whether this build can write the format.
    pub fn is_available(&self) -> bool {
        match self {
            OutputFormat::Netcdf => cfg!(feature = "netcdf"),
            OutputFormat::Json => true,
        }
    }
}
