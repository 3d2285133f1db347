//! Convert station CSV time series into CF/ACDD timeSeries containers.
pub mod error;
pub mod station;
pub mod schema;
pub mod time;
pub mod decode;
pub mod container;
pub mod metadata;
pub mod builder;
pub mod writer;
pub mod config;
pub mod generate;
pub mod logging;

#[cfg(test)]
pub(crate) mod test_utils;
