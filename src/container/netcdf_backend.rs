use std::{collections::HashMap, path::{Path, PathBuf}};

use error_stack::ResultExt;
use netcdf::{AttributeValue, Extents};

use crate::error::ContainerError;
use crate::schema::{fits_i32, StorageKind};
use super::{AttrValue, ContainerBackend, DimLength};

impl From<AttrValue> for AttributeValue {
    fn from(value: AttrValue) -> Self {
        match value {
            AttrValue::Text(s) => AttributeValue::Str(s),
            AttrValue::Int(i) => AttributeValue::Int(i),
            AttrValue::Double(v) => AttributeValue::Double(v),
        }
    }
}

/// A netCDF-4 file restricted to the classic data model.
pub struct NetcdfBackend {
    file: netcdf::FileMut,
    path: PathBuf,
    kinds: HashMap<String, StorageKind>,
}

impl NetcdfBackend {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extents selecting a single element. Only the shapes used by a
    /// timeSeries file (scalar, 1-D and 2-D) are supported.
    fn extents_for(index: &[usize]) -> Option<Extents> {
        match index {
            [] => Some(Extents::All),
            [i] => Some([*i..*i+1].into()),
            [i, j] => Some([*i..*i+1, *j..*j+1].into()),
            _ => None,
        }
    }
}

impl ContainerBackend for NetcdfBackend {
    fn create(path: &Path) -> error_stack::Result<Self, ContainerError> {
        let file = netcdf::create_with(path, netcdf::Options::NETCDF4 | netcdf::Options::CLASSIC)
            .change_context_lazy(|| ContainerError::CreateError(path.to_path_buf()))?;
        Ok(Self { file, path: path.to_path_buf(), kinds: HashMap::new() })
    }

    fn define_dimension(&mut self, name: &str, len: DimLength) -> error_stack::Result<(), ContainerError> {
        match len {
            DimLength::Fixed(n) => self.file.add_dimension(name, n).map(|_| ()),
            DimLength::Unlimited => self.file.add_unlimited_dimension(name).map(|_| ()),
        }.change_context_lazy(|| ContainerError::DimensionError(name.to_string()))
    }

    fn define_variable(&mut self, name: &str, kind: StorageKind, dims: &[&str], fill: Option<f64>)
    -> error_stack::Result<(), ContainerError> {
        let err = || ContainerError::VariableError(name.to_string());
        match kind {
            StorageKind::Float => {
                let mut var = self.file.add_variable::<f64>(name, dims).change_context_lazy(err)?;
                if let Some(f) = fill {
                    var.set_fill_value(f).change_context_lazy(err)?;
                }
            },
            StorageKind::Integer => {
                let mut var = self.file.add_variable::<i32>(name, dims).change_context_lazy(err)?;
                if let Some(f) = fill {
                    var.set_fill_value(f.round() as i32).change_context_lazy(err)?;
                }
            },
        }
        self.kinds.insert(name.to_string(), kind);
        Ok(())
    }

    fn put_global_attribute(&mut self, key: &str, value: AttrValue) -> error_stack::Result<(), ContainerError> {
        self.file.add_attribute(key, value)
            .change_context_lazy(|| ContainerError::attribute_error("the root group", key))?;
        Ok(())
    }

    fn put_variable_attribute(&mut self, var: &str, key: &str, value: AttrValue) -> error_stack::Result<(), ContainerError> {
        let mut v = self.file.variable_mut(var)
            .ok_or_else(|| ContainerError::attribute_error(var, key))
            .attach_printable_lazy(|| format!("variable '{var}' is not defined"))?;
        v.put_attribute(key, value)
            .change_context_lazy(|| ContainerError::attribute_error(var, key))?;
        Ok(())
    }

    fn write_value(&mut self, var: &str, index: &[usize], value: f64) -> error_stack::Result<(), ContainerError> {
        let kind = self.kinds.get(var).copied()
            .ok_or_else(|| ContainerError::write_error(var, index))
            .attach_printable_lazy(|| format!("variable '{var}' is not defined"))?;
        let mut v = self.file.variable_mut(var)
            .ok_or_else(|| ContainerError::write_error(var, index))?;
        let ext = Self::extents_for(index)
            .ok_or_else(|| ContainerError::write_error(var, index))
            .attach_printable("only variables with up to two dimensions are supported")?;

        match kind {
            StorageKind::Float => v.put_values(&[value], ext),
            StorageKind::Integer => {
                let r = value.round();
                if !fits_i32(r) {
                    return Err(ContainerError::write_error(var, index))
                        .attach_printable_lazy(|| format!("value {value} does not fit in a 32-bit integer"));
                }
                v.put_values(&[r as i32], ext)
            },
        }.change_context_lazy(|| ContainerError::write_error(var, index))
    }

    fn close(self) -> error_stack::Result<(), ContainerError> {
        self.file.close()
            .change_context(ContainerError::CloseError)
            .attach_printable_lazy(|| format!("closing {}", self.path.display()))
    }
}
