//! Core types for the its123 client
//!
//! Defines the data exchanged with the API:
//! - Products, their instruments and reports
//! - Instrument responses and their resource manifests
//! - Submitted form data
//! - Options for a product run

use crate::error::ProtocolError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of an instrument run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentStatus {
    /// Instrument handed out, no answers yet
    #[default]
    Started,
    /// Some pages answered
    InProgress,
    /// All items answered
    EndedItems,
    /// Respondent skipped the remainder
    EndedSkipped,
    /// Time limit reached
    EndedTime,
}

impl InstrumentStatus {
    /// Wire spelling
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::InProgress => "in-progress",
            Self::EndedItems => "ended-items",
            Self::EndedSkipped => "ended-skipped",
            Self::EndedTime => "ended-time",
        }
    }

    /// Whether the instrument is finished
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EndedItems | Self::EndedSkipped | Self::EndedTime)
    }
}

impl FromStr for InstrumentStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "in-progress" => Ok(Self::InProgress),
            "ended-items" => Ok(Self::EndedItems),
            "ended-skipped" => Ok(Self::EndedSkipped),
            "ended-time" => Ok(Self::EndedTime),
            other => Err(ProtocolError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for InstrumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instrument slot of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Access code scoping this instrument run
    pub access_code: String,
    /// Status at the time the product was fetched
    #[serde(default)]
    pub status: InstrumentStatus,
}

impl Instrument {
    /// Create instrument in `started` state
    #[inline]
    pub fn new(access_code: impl Into<String>) -> Self {
        Self {
            access_code: access_code.into(),
            status: InstrumentStatus::Started,
        }
    }
}

/// Slot section of a product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slots {
    /// Instruments in execution order
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    /// Respondent details as sent by the API
    #[serde(default)]
    pub respondent: serde_json::Value,
}

/// Report type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// Standard report (type 121)
    Standard,
    /// Premium report (type 221)
    Premium,
}

impl ReportKind {
    /// Numeric type code used by the API
    #[inline]
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::Standard => 121,
            Self::Premium => 221,
        }
    }

    /// Resolve a type name; anything but `premium` means standard
    #[inline]
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name == "premium" {
            Self::Premium
        } else {
            Self::Standard
        }
    }
}

/// Report reference of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Access code of the report
    pub access_code: String,
    /// Type code (see [`ReportKind`])
    #[serde(rename = "type")]
    pub report_type: u32,
}

/// Assessment product: ordered instruments plus reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Instruments and respondent
    pub slots: Slots,
    /// Reports available once all instruments ended
    #[serde(default)]
    pub reports: Vec<Report>,
    /// Access code of the product run
    #[serde(default)]
    pub product_access_code: String,
}

impl Product {
    /// Instruments in execution order
    #[inline]
    #[must_use]
    pub fn instruments(&self) -> &[Instrument] {
        &self.slots.instruments
    }

    /// First report of the given kind
    #[must_use]
    pub fn report(&self, kind: ReportKind) -> Option<&Report> {
        self.reports.iter().find(|r| r.report_type == kind.code())
    }
}

/// Resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Script, awaited before rendering
    Js,
    /// Stylesheet, not awaited
    Css,
}

/// Asset an instrument needs before it is shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Script or stylesheet
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// URL of the asset
    pub path: String,
    /// Load the script asynchronously
    #[serde(default, rename = "async")]
    pub is_async: bool,
    /// Initialization function exported by the script
    #[serde(default)]
    pub func: Option<String>,
}

impl Resource {
    /// Script resource
    pub fn script(path: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Js,
            path: path.into(),
            is_async: false,
            func: None,
        }
    }

    /// Stylesheet resource
    pub fn stylesheet(path: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Css,
            path: path.into(),
            is_async: false,
            func: None,
        }
    }

    /// With initialization function
    #[must_use]
    pub fn with_func(mut self, func: impl Into<String>) -> Self {
        self.func = Some(func.into());
        self
    }
}

/// Named resources in declaration order
pub type ResourceManifest = IndexMap<String, Resource>;

/// One page of an instrument as returned by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentResponse {
    /// Rendered HTML
    pub body: String,
    /// Raw status header; validated by the state machine
    pub status: String,
    /// Assets to load before showing `body`
    pub resources: ResourceManifest,
}

/// Submitted form fields in document order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormData {
    fields: Vec<(String, String)>,
}

impl FormData {
    /// Empty form
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field; repeated names are kept
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Builder form of [`push`](Self::push)
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// First value for `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All fields
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field was submitted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Options for [`load_product`](crate::ProductOrchestrator::load_product)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Render the first report once all instruments ended
    pub render_report: bool,
    /// Resume from and persist to the store
    pub storage: bool,
    /// Respondent UUID, empty for anonymous runs
    pub user: String,
}

impl LoadOptions {
    /// Default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With report rendering on or off
    #[inline]
    #[must_use]
    pub fn with_render_report(mut self, render_report: bool) -> Self {
        self.render_report = render_report;
        self
    }

    /// With store usage on or off
    #[inline]
    #[must_use]
    pub fn with_storage(mut self, storage: bool) -> Self {
        self.storage = storage;
        self
    }

    /// With respondent
    #[inline]
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            render_report: true,
            storage: true,
            user: String::new(),
        }
    }
}

/// Signed meta data appended to report requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMeta {
    /// Base64 encoded meta data
    pub data: String,
    /// HMAC over `data`
    pub hmac: String,
}

impl ReportMeta {
    /// Create meta pair
    pub fn new(data: impl Into<String>, hmac: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            hmac: hmac.into(),
        }
    }

    /// Both parts present; incomplete meta is not sent
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.data.is_empty() && !self.hmac.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_parsing() {
        assert_eq!(
            "in-progress".parse::<InstrumentStatus>().unwrap(),
            InstrumentStatus::InProgress
        );
        assert!(matches!(
            "bogus".parse::<InstrumentStatus>(),
            Err(ProtocolError::UnknownStatus(s)) if s == "bogus"
        ));
    }

    #[test]
    fn terminal_statuses() {
        assert!(InstrumentStatus::EndedItems.is_terminal());
        assert!(InstrumentStatus::EndedSkipped.is_terminal());
        assert!(InstrumentStatus::EndedTime.is_terminal());
        assert!(!InstrumentStatus::Started.is_terminal());
        assert!(!InstrumentStatus::InProgress.is_terminal());
    }

    #[test]
    fn product_deserializes_api_shape() {
        let json = r#"{
            "slots": {
                "instruments": [
                    {"access_code": "I1", "status": "started"},
                    {"access_code": "I2"}
                ],
                "respondent": {"name": "anon"}
            },
            "reports": [{"access_code": "R1", "type": 121}, {"access_code": "R2", "type": 221}],
            "product_access_code": "PA"
        }"#;

        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.instruments().len(), 2);
        assert_eq!(product.instruments()[1].status, InstrumentStatus::Started);
        assert_eq!(product.report(ReportKind::Premium).unwrap().access_code, "R2");
        assert_eq!(product.product_access_code, "PA");
    }

    #[test]
    fn report_kind_names() {
        assert_eq!(ReportKind::from_name("premium").code(), 221);
        assert_eq!(ReportKind::from_name("standard").code(), 121);
        assert_eq!(ReportKind::from_name("anything").code(), 121);
    }

    #[test]
    fn manifest_keeps_declaration_order() {
        let json = r#"{
            "zeta": {"type": "css", "path": "/z.css"},
            "alpha": {"type": "js", "path": "/a.js", "async": true, "func": "initAlpha"}
        }"#;
        let manifest: ResourceManifest = serde_json::from_str(json).unwrap();
        let names: Vec<_> = manifest.keys().cloned().collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(manifest["alpha"].is_async);
        assert_eq!(manifest["alpha"].func.as_deref(), Some("initAlpha"));
    }

    #[test]
    fn form_data_keeps_repeated_fields() {
        let form = FormData::new()
            .with_field("q1", "a")
            .with_field("q2", "b")
            .with_field("q2", "c");
        assert_eq!(form.len(), 3);
        assert_eq!(form.get("q2"), Some("b"));
    }

    #[test]
    fn report_meta_completeness() {
        assert!(ReportMeta::new("abc", "def").is_complete());
        assert!(!ReportMeta::new("abc", "").is_complete());
        assert!(!ReportMeta::default().is_complete());
    }
}
