use std::{fs::File, io::BufWriter, path::{Path, PathBuf}};

use error_stack::ResultExt;
use indexmap::IndexMap;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::ContainerError;
use crate::schema::{fits_i32, StorageKind};
use super::{AttrValue, ContainerBackend, DimLength, DEFAULT_FILL_F64, DEFAULT_FILL_I32};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct MemoryDimension {
    len: usize,
    unlimited: bool,
}

/// A variable held by a [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryVariable {
    kind: StorageKind,
    dims: Vec<String>,
    fill: f64,
    attributes: IndexMap<String, AttrValue>,
    /// Row-major values written so far; slots never written hold `fill`.
    values: Vec<f64>,
}

impl MemoryVariable {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(|k| k.as_str())
    }
}

/// A container kept entirely in memory.
///
/// Behaves like a classic-model netCDF file: dimensions and variables must
/// all be defined before the first value is written, an unlimited dimension
/// may only be the first dimension of a variable, and fixed dimensions are
/// bounds checked. When created with a path, the whole container is written
/// there as JSON on [`close`](ContainerBackend::close).
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryBackend {
    #[serde(skip)]
    path: Option<PathBuf>,
    #[serde(skip)]
    frozen: bool,
    dimensions: IndexMap<String, MemoryDimension>,
    attributes: IndexMap<String, AttrValue>,
    variables: IndexMap<String, MemoryVariable>,
}

impl MemoryBackend {
    /// A container with no file behind it.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Read back a container previously closed to `path`.
    pub fn load(path: &Path) -> error_stack::Result<Self, ContainerError> {
        let f = File::open(path)
            .change_context_lazy(|| ContainerError::CreateError(path.to_path_buf()))
            .attach_printable("could not open JSON container for reading")?;
        let me = serde_json::from_reader(std::io::BufReader::new(f))
            .change_context_lazy(|| ContainerError::CreateError(path.to_path_buf()))
            .attach_printable("could not deserialize JSON container")?;
        Ok(me)
    }

    pub fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).map(|d| d.len)
    }

    pub fn is_unlimited(&self, name: &str) -> Option<bool> {
        self.dimensions.get(name).map(|d| d.unlimited)
    }

    pub fn global_attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn global_attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(|k| k.as_str())
    }

    pub fn variable(&self, name: &str) -> Option<&MemoryVariable> {
        self.variables.get(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }

    /// The full array for a variable, shaped by the current dimension lengths.
    /// Unwritten slots hold the variable's fill value.
    pub fn values(&self, name: &str) -> Option<ArrayD<f64>> {
        let var = self.variables.get(name)?;
        let shape = var.dims.iter()
            .map(|d| self.dimension_len(d))
            .collect::<Option<Vec<_>>>()?;
        let n: usize = shape.iter().product();
        let mut values = var.values.clone();
        values.resize(n, var.fill);
        ArrayD::from_shape_vec(IxDyn(&shape), values).ok()
    }

    fn check_not_frozen(&self, what: &str) -> Result<(), ContainerError> {
        if self.frozen {
            log::error!("Cannot define {what} after data has been written");
            Err(ContainerError::VariableError(what.to_string()))
        } else {
            Ok(())
        }
    }
}

impl ContainerBackend for MemoryBackend {
    fn create(path: &Path) -> error_stack::Result<Self, ContainerError> {
        File::create(path)
            .change_context_lazy(|| ContainerError::CreateError(path.to_path_buf()))?;
        Ok(Self { path: Some(path.to_path_buf()), ..Default::default() })
    }

    fn define_dimension(&mut self, name: &str, len: DimLength) -> error_stack::Result<(), ContainerError> {
        if self.frozen || self.dimensions.contains_key(name) {
            return Err(ContainerError::DimensionError(name.to_string()).into());
        }
        let dim = match len {
            DimLength::Fixed(n) => MemoryDimension { len: n, unlimited: false },
            DimLength::Unlimited => MemoryDimension { len: 0, unlimited: true },
        };
        self.dimensions.insert(name.to_string(), dim);
        Ok(())
    }

    fn define_variable(&mut self, name: &str, kind: StorageKind, dims: &[&str], fill: Option<f64>)
    -> error_stack::Result<(), ContainerError> {
        self.check_not_frozen(name)?;
        if self.variables.contains_key(name) {
            return Err(ContainerError::VariableError(name.to_string()))
                .attach_printable("variable already defined");
        }

        for (i, d) in dims.iter().enumerate() {
            match self.dimensions.get(*d) {
                None => return Err(ContainerError::VariableError(name.to_string()))
                    .attach_printable_lazy(|| format!("dimension '{d}' is not defined")),
                Some(dim) if dim.unlimited && i > 0 => return Err(ContainerError::VariableError(name.to_string()))
                    .attach_printable_lazy(|| format!("unlimited dimension '{d}' must be the first dimension")),
                _ => {},
            }
        }

        let fill = match (kind, fill) {
            (StorageKind::Float, Some(f)) => f,
            (StorageKind::Float, None) => DEFAULT_FILL_F64,
            (StorageKind::Integer, Some(f)) => f.round(),
            (StorageKind::Integer, None) => DEFAULT_FILL_I32 as f64,
        };

        let mut attributes = IndexMap::new();
        attributes.insert("_FillValue".to_string(), AttrValue::for_kind(kind, fill));

        self.variables.insert(name.to_string(), MemoryVariable {
            kind,
            dims: dims.iter().map(|d| d.to_string()).collect(),
            fill,
            attributes,
            values: vec![],
        });
        Ok(())
    }

    fn put_global_attribute(&mut self, key: &str, value: AttrValue) -> error_stack::Result<(), ContainerError> {
        if self.frozen {
            return Err(ContainerError::attribute_error("the container", key).into());
        }
        self.attributes.insert(key.to_string(), value);
        Ok(())
    }

    fn put_variable_attribute(&mut self, var: &str, key: &str, value: AttrValue) -> error_stack::Result<(), ContainerError> {
        if self.frozen {
            return Err(ContainerError::attribute_error(var, key))
                .attach_printable("data has already been written");
        }
        let v = self.variables.get_mut(var)
            .ok_or_else(|| ContainerError::attribute_error(var, key))
            .attach_printable_lazy(|| format!("variable '{var}' is not defined"))?;
        v.attributes.insert(key.to_string(), value);
        Ok(())
    }

    fn write_value(&mut self, var: &str, index: &[usize], value: f64) -> error_stack::Result<(), ContainerError> {
        let dims = self.variables.get(var)
            .ok_or_else(|| ContainerError::write_error(var, index))
            .attach_printable_lazy(|| format!("variable '{var}' is not defined"))?
            .dims.clone();

        if dims.len() != index.len() {
            return Err(ContainerError::write_error(var, index))
                .attach_printable_lazy(|| format!("variable has {} dimensions", dims.len()));
        }

        let mut lengths = Vec::with_capacity(dims.len());
        for (d, &i) in dims.iter().zip(index) {
            let dim = self.dimensions.get_mut(d)
                .ok_or_else(|| ContainerError::write_error(var, index))?;
            if dim.unlimited {
                dim.len = dim.len.max(i + 1);
            } else if i >= dim.len {
                return Err(ContainerError::write_error(var, index))
                    .attach_printable_lazy(|| format!("index {i} is out of bounds for dimension '{d}' of length {}", dim.len));
            }
            lengths.push(dim.len);
        }

        let mut flat = 0;
        for (&i, &len) in index.iter().zip(lengths.iter()) {
            flat = flat * len + i;
        }

        let v = self.variables.get_mut(var)
            .ok_or_else(|| ContainerError::write_error(var, index))?;
        let value = match v.kind {
            StorageKind::Float => value,
            StorageKind::Integer => {
                let r = value.round();
                if !fits_i32(r) {
                    return Err(ContainerError::write_error(var, index))
                        .attach_printable_lazy(|| format!("value {value} does not fit in a 32-bit integer"));
                }
                r
            }
        };

        if v.values.len() <= flat {
            v.values.resize(flat + 1, v.fill);
        }
        v.values[flat] = value;
        self.frozen = true;
        Ok(())
    }

    fn close(self) -> error_stack::Result<(), ContainerError> {
        if let Some(path) = &self.path {
            let f = File::create(path)
                .change_context(ContainerError::CloseError)
                .attach_printable_lazy(|| format!("could not reopen {}", path.display()))?;
            serde_json::to_writer_pretty(BufWriter::new(f), &self)
                .change_context(ContainerError::CloseError)
                .attach_printable_lazy(|| format!("could not serialize container to {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_dim() -> MemoryBackend {
        let mut mem = MemoryBackend::in_memory();
        mem.define_dimension("time", DimLength::Unlimited).unwrap();
        mem.define_dimension("station", DimLength::Fixed(1)).unwrap();
        mem.define_variable("x", StorageKind::Float, &["time", "station"], Some(-999.0)).unwrap();
        mem
    }

    #[test]
    fn test_unlimited_grows_and_pads_with_fill() {
        let mut mem = two_dim();
        mem.write_value("x", &[0, 0], 1.5).unwrap();
        mem.write_value("x", &[2, 0], 3.5).unwrap();
        assert_eq!(mem.dimension_len("time"), Some(3));
        let x = mem.values("x").unwrap();
        assert_eq!(x.shape(), &[3, 1]);
        assert_eq!(x.iter().copied().collect::<Vec<_>>(), vec![1.5, -999.0, 3.5]);
    }

    #[test]
    fn test_fixed_dimension_bounds() {
        let mut mem = two_dim();
        assert!(mem.write_value("x", &[0, 1], 1.0).is_err());
        assert!(mem.write_value("x", &[0], 1.0).is_err());
        assert!(mem.write_value("y", &[0, 0], 1.0).is_err());
    }

    #[test]
    fn test_definitions_frozen_after_write() {
        let mut mem = two_dim();
        mem.write_value("x", &[0, 0], 1.0).unwrap();
        assert!(mem.define_variable("y", StorageKind::Float, &["time"], None).is_err());
        assert!(mem.define_dimension("other", DimLength::Fixed(2)).is_err());
        assert!(mem.put_global_attribute("title", "late".into()).is_err());
        assert!(mem.put_variable_attribute("x", "units", "m".into()).is_err());
    }

    #[test]
    fn test_unlimited_must_lead() {
        let mut mem = two_dim();
        assert!(mem.define_variable("y", StorageKind::Float, &["station", "time"], None).is_err());
    }

    #[test]
    fn test_integer_variables_round() {
        let mut mem = MemoryBackend::in_memory();
        mem.define_variable("flag", StorageKind::Integer, &[], None).unwrap();
        assert_eq!(mem.variable("flag").unwrap().attribute("_FillValue"), Some(&AttrValue::Int(DEFAULT_FILL_I32)));
        mem.write_value("flag", &[], 2.5).unwrap();
        assert_eq!(mem.values("flag").unwrap().into_raw_vec(), vec![3.0]);
        assert!(mem.write_value("flag", &[], 1e12).is_err());
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut mem = MemoryBackend::create(&path).unwrap();
        assert!(path.exists());
        mem.define_dimension("time", DimLength::Unlimited).unwrap();
        mem.define_variable("t", StorageKind::Float, &["time"], Some(-1.0)).unwrap();
        mem.put_global_attribute("title", "test".into()).unwrap();
        mem.put_variable_attribute("t", "valid_min", AttrValue::Double(0.0)).unwrap();
        mem.write_value("t", &[1], 60.0).unwrap();
        let expected = mem.clone();
        mem.close().unwrap();

        let loaded = MemoryBackend::load(&path).unwrap();
        assert_eq!(loaded.values("t"), expected.values("t"));
        assert_eq!(loaded.global_attribute("title").and_then(|a| a.as_str()), Some("test"));
        assert_eq!(loaded.variable("t").unwrap().attribute("valid_min"), Some(&AttrValue::Double(0.0)));
    }
}
