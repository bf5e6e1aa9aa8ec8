//! Reading / ReadingSet - the data moving through every pipeline stage
//!
//! A `ReadingSet` owns its readings. Moving a set between stages moves the
//! readings with it; the only places that copy are branch fan-out and
//! debugger capture, both of which go through [`ReadingSet::deep_copy`].

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Image carried inside a datapoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatapointImage {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bits per pixel (8 = grey, 24 = RGB, 32 = RGBA)
    pub depth: u8,

    /// Raw pixel bytes, row-major
    pub data: Bytes,
}

/// Tagged value of a datapoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DatapointValue {
    Integer(i64),
    Float(f64),
    String(String),
    FloatArray(Vec<f64>),
    /// Opaque binary buffer
    Buffer(Bytes),
    Image(DatapointImage),
    /// Nested named datapoints; the dict owns its children
    Dict(Vec<Datapoint>),
    /// Nested ordered datapoints; the list owns its children
    List(Vec<Datapoint>),
}

impl DatapointValue {
    /// Numeric view used by arithmetic filters
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Short type tag for logs and summaries
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::FloatArray(_) => "float_array",
            Self::Buffer(_) => "buffer",
            Self::Image(_) => "image",
            Self::Dict(_) => "dict",
            Self::List(_) => "list",
        }
    }

    /// Copy without sharing any buffer with `self`.
    ///
    /// `Bytes` clones share their allocation, so binary payloads are copied
    /// explicitly here.
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Buffer(b) => Self::Buffer(Bytes::copy_from_slice(b)),
            Self::Image(img) => Self::Image(DatapointImage {
                width: img.width,
                height: img.height,
                depth: img.depth,
                data: Bytes::copy_from_slice(&img.data),
            }),
            Self::Dict(children) => Self::Dict(children.iter().map(Datapoint::deep_copy).collect()),
            Self::List(children) => Self::List(children.iter().map(Datapoint::deep_copy).collect()),
            other => other.clone(),
        }
    }
}

impl From<i64> for DatapointValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for DatapointValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DatapointValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for DatapointValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<f64>> for DatapointValue {
    fn from(v: Vec<f64>) -> Self {
        Self::FloatArray(v)
    }
}

/// Named value within a reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub name: String,
    pub value: DatapointValue,
}

impl Datapoint {
    pub fn new(name: impl Into<String>, value: impl Into<DatapointValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn deep_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            value: self.value.deep_copy(),
        }
    }
}

/// One timestamped observation for an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    asset_name: String,

    /// Assigned by storage, never by the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,

    timestamp: DateTime<Utc>,

    user_timestamp: DateTime<Utc>,

    datapoints: Vec<Datapoint>,
}

impl Reading {
    /// Create a reading stamped with the current time
    pub fn new(asset_name: impl Into<String>, datapoints: Vec<Datapoint>) -> Self {
        let now = Utc::now();
        Self {
            asset_name: asset_name.into(),
            id: None,
            timestamp: now,
            user_timestamp: now,
            datapoints,
        }
    }

    /// Create a reading with a single datapoint
    pub fn single(asset_name: impl Into<String>, datapoint: Datapoint) -> Self {
        Self::new(asset_name, vec![datapoint])
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_user_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.user_timestamp = ts;
        self
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    pub fn set_asset_name(&mut self, name: impl Into<String>) {
        self.asset_name = name.into();
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn user_timestamp(&self) -> DateTime<Utc> {
        self.user_timestamp
    }

    pub fn datapoints(&self) -> &[Datapoint] {
        &self.datapoints
    }

    pub fn datapoints_mut(&mut self) -> &mut Vec<Datapoint> {
        &mut self.datapoints
    }

    pub fn add_datapoint(&mut self, datapoint: Datapoint) {
        self.datapoints.push(datapoint);
    }

    /// Look up a top-level datapoint by name
    pub fn datapoint(&self, name: &str) -> Option<&Datapoint> {
        self.datapoints.iter().find(|dp| dp.name == name)
    }

    pub fn deep_copy(&self) -> Self {
        Self {
            asset_name: self.asset_name.clone(),
            id: self.id,
            timestamp: self.timestamp,
            user_timestamp: self.user_timestamp,
            datapoints: self.datapoints.iter().map(Datapoint::deep_copy).collect(),
        }
    }
}

/// Ordered batch of readings, the unit of transfer between stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingSet {
    readings: Vec<Reading>,
}

impl ReadingSet {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of readings; always equal to `readings().len()`
    pub fn count(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Id of the last reading, only defined for a non-empty set
    pub fn last_id(&self) -> Option<u64> {
        self.readings.last().and_then(Reading::id)
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn readings_mut(&mut self) -> &mut Vec<Reading> {
        &mut self.readings
    }

    pub fn push(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    /// Move every reading of `other` to the end of this set
    pub fn append(&mut self, mut other: ReadingSet) {
        self.readings.append(&mut other.readings);
    }

    /// Take all readings out, leaving the set empty
    pub fn remove_all(&mut self) -> Vec<Reading> {
        std::mem::take(&mut self.readings)
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.readings
    }

    /// Full copy with fresh reading and datapoint instances
    pub fn deep_copy(&self) -> Self {
        Self {
            readings: self.readings.iter().map(Reading::deep_copy).collect(),
        }
    }
}

impl From<Vec<Reading>> for ReadingSet {
    fn from(readings: Vec<Reading>) -> Self {
        Self::new(readings)
    }
}

impl IntoIterator for ReadingSet {
    type Item = Reading;
    type IntoIter = std::vec::IntoIter<Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReadingSet {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}
