//! File-level (global) attributes following the NCEI timeSeries template.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::container::AttrValue;
use crate::error::ConfigError;
use crate::station::{Instrument, StationDescriptor};

pub const NCEI_TEMPLATE_VERSION: &str = "NCEI_NetCDF_TimeSeries_Orthogonal_Template_v2.0";

/// Global attributes computed from the station, the run, or fixed by the
/// feature type. Extra attributes may not reuse these names.
pub const DERIVED_ATTRIBUTES: &[&str] = &[
    "ncei_template_version", "featureType", "cdm_data_type", "Conventions", "id",
    "naming_authority", "history", "date_created", "date_modified", "date_metadata_modified",
    "geospatial_lat_min", "geospatial_lat_max", "geospatial_lon_min", "geospatial_lon_max",
    "geospatial_vertical_min", "geospatial_vertical_max", "geospatial_vertical_positive",
    "geospatial_lat_units", "geospatial_lon_units", "geospatial_vertical_units",
    "uuid", "platform", "instrument",
];

/// Global attributes taken directly from [`GlobalMetadata`] fields.
const TEMPLATE_ATTRIBUTES: &[&str] = &[
    "title", "summary", "keywords", "source", "processing_level", "comment", "acknowledgment",
    "license", "standard_name_vocabulary", "creator_name", "creator_email", "creator_url",
    "creator_type", "creator_institution", "institution", "project", "program",
    "publisher_name", "publisher_email", "publisher_url", "publisher_type",
    "publisher_institution", "contributor_name", "contributor_role", "sea_name",
    "date_issued", "product_version", "platform_vocabulary", "instrument_vocabulary",
    "metadata_link", "references",
];

/// Global attributes that change with the generation instant. Everything
/// else in a file is fully determined by its inputs.
pub const VOLATILE_ATTRIBUTES: &[&str] = &["history", "date_created", "date_modified", "date_metadata_modified"];

/// Descriptive metadata written as global attributes.
///
/// Every field is optional in the configuration; the defaults produce an
/// empty (but present) attribute so that the template is always complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GlobalMetadata {
    /// Defaults to "Time series data for <station urn>".
    pub title: String,
    pub summary: String,
    pub keywords: String,
    pub conventions: String,
    /// Prefix of the `history` attribute, followed by the generation date.
    pub history_label: String,
    pub source: String,
    pub processing_level: String,
    pub comment: String,
    pub acknowledgment: String,
    pub license: String,
    pub standard_name_vocabulary: String,
    pub creator_name: String,
    pub creator_email: String,
    pub creator_url: String,
    pub creator_type: String,
    pub creator_institution: String,
    pub institution: String,
    pub project: String,
    pub program: String,
    pub publisher_name: String,
    pub publisher_email: String,
    pub publisher_url: String,
    pub publisher_type: String,
    pub publisher_institution: String,
    pub contributor_name: String,
    pub contributor_role: String,
    /// CRS of the vertical coordinate, e.g. "EPSG:4979"
    pub vertical_crs: String,
    pub sea_name: String,
    pub date_issued: String,
    pub product_version: String,
    pub platform_vocabulary: String,
    pub instrument_vocabulary: String,
    pub metadata_link: String,
    pub references: String,
    /// Additional attributes, written after the template ones in this order.
    pub extra: IndexMap<String, String>,
}

impl Default for GlobalMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            summary: String::new(),
            keywords: String::new(),
            conventions: "CF-1.6,ACDD-1.3".to_string(),
            history_label: "V1".to_string(),
            source: String::new(),
            processing_level: "Data ingested as provided.".to_string(),
            comment: String::new(),
            acknowledgment: String::new(),
            license: String::new(),
            standard_name_vocabulary: "CF-1.6".to_string(),
            creator_name: String::new(),
            creator_email: String::new(),
            creator_url: String::new(),
            creator_type: "institution".to_string(),
            creator_institution: String::new(),
            institution: String::new(),
            project: String::new(),
            program: String::new(),
            publisher_name: String::new(),
            publisher_email: String::new(),
            publisher_url: String::new(),
            publisher_type: "institution".to_string(),
            publisher_institution: String::new(),
            contributor_name: String::new(),
            contributor_role: String::new(),
            vertical_crs: "EPSG:4979".to_string(),
            sea_name: String::new(),
            date_issued: String::new(),
            product_version: "Ver. 1.0".to_string(),
            platform_vocabulary: String::new(),
            instrument_vocabulary: String::new(),
            metadata_link: String::new(),
            references: String::new(),
            extra: IndexMap::new(),
        }
    }
}

impl GlobalMetadata {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let clash = self.extra.keys()
            .find(|k| DERIVED_ATTRIBUTES.contains(&k.as_str()) || TEMPLATE_ATTRIBUTES.contains(&k.as_str()));
        if let Some(k) = clash {
            return Err(ConfigError::invalid_option(
                format!("metadata.extra.{k}"),
                "this attribute is already written from the station or the metadata section"
            ));
        }
        Ok(())
    }

    /// Deterministic file UUID (version 5), derived from the naming
    /// authority and the file id.
    pub fn file_uuid(naming_authority: &str, file_id: &str) -> uuid::Uuid {
        let name = format!("{naming_authority}/{file_id}");
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, name.as_bytes())
    }

    /// Produce the complete, ordered list of global attributes.
    ///
    /// `instruments` are the instruments actually referenced by the data
    /// variables; `file_id` is normally the output file stem.
    pub fn global_attributes(
        &self,
        station: &StationDescriptor,
        instruments: &[&Instrument],
        file_id: &str,
        generated_at: DateTime<Utc>,
    ) -> Vec<(String, AttrValue)> {
        let date = generated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let pos = &station.position;
        let title = if self.title.is_empty() {
            format!("Time series data for {}", station.urn)
        } else {
            self.title.clone()
        };
        let instrument_names = instruments.iter().map(|i| i.long_name.as_str()).join(", ");

        let mut attrs: Vec<(&str, AttrValue)> = vec![
            ("ncei_template_version", NCEI_TEMPLATE_VERSION.into()),
            ("featureType", "timeSeries".into()),
            ("cdm_data_type", "Station".into()),
            ("Conventions", (&self.conventions).into()),
            ("title", title.into()),
            ("summary", (&self.summary).into()),
            ("keywords", (&self.keywords).into()),
            ("id", file_id.into()),
            ("naming_authority", (&station.naming_authority).into()),
            ("history", format!("{} {}", self.history_label, generated_at.format("%Y-%m-%d")).trim().into()),
            ("source", (&self.source).into()),
            ("processing_level", (&self.processing_level).into()),
            ("comment", (&self.comment).into()),
            ("acknowledgment", (&self.acknowledgment).into()),
            ("license", (&self.license).into()),
            ("standard_name_vocabulary", (&self.standard_name_vocabulary).into()),
            ("date_created", date.as_str().into()),
            ("creator_name", (&self.creator_name).into()),
            ("creator_email", (&self.creator_email).into()),
            ("creator_url", (&self.creator_url).into()),
            ("creator_type", (&self.creator_type).into()),
            ("creator_institution", (&self.creator_institution).into()),
            ("institution", (&self.institution).into()),
            ("project", (&self.project).into()),
            ("program", (&self.program).into()),
            ("publisher_name", (&self.publisher_name).into()),
            ("publisher_email", (&self.publisher_email).into()),
            ("publisher_url", (&self.publisher_url).into()),
            ("publisher_type", (&self.publisher_type).into()),
            ("publisher_institution", (&self.publisher_institution).into()),
            ("contributor_name", (&self.contributor_name).into()),
            ("contributor_role", (&self.contributor_role).into()),
            ("geospatial_lat_min", pos.latitude.into()),
            ("geospatial_lat_max", pos.latitude.into()),
            ("geospatial_lat_units", "degrees_north".into()),
            ("geospatial_lon_min", pos.longitude.into()),
            ("geospatial_lon_max", pos.longitude.into()),
            ("geospatial_lon_units", "degrees_east".into()),
            ("geospatial_vertical_min", pos.vertical.into()),
            ("geospatial_vertical_max", pos.vertical.into()),
            ("geospatial_vertical_units", (&self.vertical_crs).into()),
            ("geospatial_vertical_positive", pos.vertical_sense.to_string().into()),
            ("uuid", Self::file_uuid(&station.naming_authority, file_id).to_string().into()),
            ("sea_name", (&self.sea_name).into()),
            ("date_modified", date.as_str().into()),
            ("date_issued", (&self.date_issued).into()),
            ("date_metadata_modified", date.as_str().into()),
            ("product_version", (&self.product_version).into()),
            ("platform", (&station.urn).into()),
            ("platform_vocabulary", (&self.platform_vocabulary).into()),
            ("instrument", instrument_names.into()),
            ("instrument_vocabulary", (&self.instrument_vocabulary).into()),
            ("metadata_link", (&self.metadata_link).into()),
            ("references", (&self.references).into()),
        ];

        attrs.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.into())));
        attrs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test_utils::station_c10;

    fn find<'a>(attrs: &'a [(String, AttrValue)], key: &str) -> Option<&'a AttrValue> {
        attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_derived_attributes() {
        let station = station_c10();
        let instr = Instrument { id: "met".to_string(), long_name: "RM Young 61202V".to_string(), comment: String::new() };
        let t = Utc.with_ymd_and_hms(2016, 2, 16, 12, 0, 0).unwrap();
        let attrs = GlobalMetadata::default().global_attributes(&station, &[&instr], "c10_2015_11_atm", t);

        assert_eq!(find(&attrs, "id").and_then(|a| a.as_str()), Some("c10_2015_11_atm"));
        assert_eq!(find(&attrs, "title").and_then(|a| a.as_str()), Some("Time series data for ioos:station:USF.COMPS:C10"));
        assert_eq!(find(&attrs, "history").and_then(|a| a.as_str()), Some("V1 2016-02-16"));
        assert_eq!(find(&attrs, "date_created").and_then(|a| a.as_str()), Some("2016-02-16T12:00:00Z"));
        assert_eq!(find(&attrs, "geospatial_lat_min").and_then(|a| a.as_f64()), Some(27.169));
        assert_eq!(find(&attrs, "geospatial_vertical_positive").and_then(|a| a.as_str()), Some("up"));
        assert_eq!(find(&attrs, "instrument").and_then(|a| a.as_str()), Some("RM Young 61202V"));
        assert!(find(&attrs, "acknowledgment").is_some());
        assert!(find(&attrs, "acknowledment").is_none());
    }

    #[test]
    fn test_uuid_is_deterministic() {
        let a = GlobalMetadata::file_uuid("ioos:station:USF.COMPS", "c10");
        let b = GlobalMetadata::file_uuid("ioos:station:USF.COMPS", "c10");
        let c = GlobalMetadata::file_uuid("ioos:station:USF.COMPS", "c12");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn test_extra_attributes() {
        let mut md = GlobalMetadata::default();
        md.extra.insert("gts_ingest".to_string(), "true".to_string());
        md.validate().unwrap();
        let attrs = md.global_attributes(&station_c10(), &[], "x", Utc::now());
        assert_eq!(attrs.last().map(|(k, _)| k.as_str()), Some("gts_ingest"));

        md.extra.insert("uuid".to_string(), "abc".to_string());
        assert!(md.validate().is_err());
        md.extra.shift_remove("uuid");
        md.extra.insert("title".to_string(), "abc".to_string());
        assert!(md.validate().is_err());
    }
}
