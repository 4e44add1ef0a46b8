//! Device data export.
//!
//! Produces one flat [`ExportRecord`] per device, serialized as JSON or CSV.
//! The CSV header row follows [`ExportRecord::FIELDS`] and is written even
//! when there are no rows.

use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use zigsight_types::{BRIDGE_DEVICE_ID, DeviceRecord, ExportRecord};

use crate::error::{Error, Result};

/// Output format for exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    /// MIME type of the serialized output.
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    /// File extension for downloads.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::invalid_config(format!(
                "Invalid export format: {} (expected json or csv)",
                other
            ))),
        }
    }
}

/// Which devices to include in an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFilter {
    device_ids: Option<Vec<String>>,
}

impl ExportFilter {
    /// Include every device.
    pub fn all() -> Self {
        Self::default()
    }

    /// Include only the listed devices.
    pub fn devices<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            device_ids: Some(ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Parse a comma separated id list. Blank input selects every device.
    ///
    /// ```
    /// use zigsight_core::export::ExportFilter;
    ///
    /// assert_eq!(ExportFilter::parse_list(""), ExportFilter::all());
    /// assert!(ExportFilter::parse_list("a, b").matches("b"));
    /// assert!(!ExportFilter::parse_list("a,b").matches("c"));
    /// ```
    pub fn parse_list(list: &str) -> Self {
        let ids: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect();
        if ids.is_empty() {
            Self::all()
        } else {
            Self {
                device_ids: Some(ids),
            }
        }
    }

    /// Whether `device_id` passes the filter.
    pub fn matches(&self, device_id: &str) -> bool {
        match &self.device_ids {
            Some(ids) => ids.iter().any(|id| id == device_id),
            None => true,
        }
    }
}

/// Build export rows in device order, skipping the bridge.
pub fn export_records(
    devices: &IndexMap<String, DeviceRecord>,
    filter: &ExportFilter,
) -> Vec<ExportRecord> {
    devices
        .iter()
        .filter(|(id, _)| id.as_str() != BRIDGE_DEVICE_ID && filter.matches(id))
        .map(|(_, device)| ExportRecord::from(device))
        .collect()
}

/// Serialize rows as CSV with a header row.
pub fn to_csv(records: &[ExportRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(ExportRecord::FIELDS)?;
    for record in records {
        writer.serialize(record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(e.to_string()))
}

/// Serialize rows as a pretty-printed JSON array.
pub fn to_json(records: &[ExportRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Serialize rows in `format`.
pub fn render(records: &[ExportRecord], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(records),
        ExportFormat::Csv => to_csv(records),
    }
}
