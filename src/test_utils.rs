//! Shared fixtures for unit tests: the USF COMPS C10 atmospheric station.
use crate::config::GeneratorConfig;
use crate::schema::VariableSchema;
use crate::station::StationDescriptor;

pub(crate) const C10_CONFIG_TOML: &str = r#"
input = "c10_2015_11_atm.csv"
output = "c10_2015_11_atm.nc"
row_count = 3

[station]
urn = "ioos:station:USF.COMPS:C10"
description = "C10: Navy-2"
naming_authority = "ioos:station:USF.COMPS"
url = "http://comps.marine.usf.edu/"

[station.position]
latitude = 27.169
longitude = -82.926
vertical = 3.0
vertical_sense = "up"

[station.platform]
wmo_code = "42013"
ncei_code = "147F, 3614"

[metadata]
summary = "2015-11 time series data for ioos:station:USF.COMPS:C10"
institution = "Gulf of Mexico Coastal Ocean Observing System (GCOOS)"

[[instruments]]
id = "met"
long_name = "RM Young 61202V, RM Young 41372VC/Analog 1 V Single"
comment = "Atmospheric probe and wind sensor"

[[variables]]
name = "air_pressure"
standard_name = "air_pressure"
units = "mbar"
fill_value = -999.0
valid_min = 700.0
valid_max = 1040.0
instrument = "met"

[[variables]]
name = "air_temperature"
standard_name = "air_temperature"
units = "Celsius"
fill_value = -999.0
valid_min = -10.0
valid_max = 40.0
instrument = "met"
"#;

pub(crate) const C10_CSV: &str = "date,time,air_pressure,air_temperature
2015-11-01,00:00:00,1013.2,21.5
2015-11-01,01:00:00,bad,22.0
2015-11-01,02:00:00,1012.9,21.8
";

pub(crate) fn c10_config() -> GeneratorConfig {
    toml::from_str(C10_CONFIG_TOML).expect("C10 test configuration should parse")
}

pub(crate) fn station_c10() -> StationDescriptor {
    c10_config().station
}

pub(crate) fn pressure_schema() -> VariableSchema {
    VariableSchema::new("air_pressure", "air_pressure", "mbar", -999.0, 700.0, 1040.0)
}
