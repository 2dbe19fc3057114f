use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of artifact streamed to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Code,
    Data,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata sent with `artifact_stream_start`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactMetadata {
    Code {
        language: String,
        title: String,
    },
    Data {
        title: String,
        format: String,
        columns: Vec<String>,
    },
}

impl ArtifactMetadata {
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Self::Code { .. } => ArtifactType::Code,
            Self::Data { .. } => ArtifactType::Data,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Code { title, .. } | Self::Data { title, .. } => title,
        }
    }
}

/// A single scalar cell of a data artifact row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Payload of one `ArtifactChunk`: a line of code or a row of data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactPayload {
    Line(String),
    Row(Vec<CellValue>),
}

impl ArtifactPayload {
    pub fn as_line(&self) -> Option<&str> {
        match self {
            Self::Line(line) => Some(line),
            Self::Row(_) => None,
        }
    }

    pub fn as_row(&self) -> Option<&[CellValue]> {
        match self {
            Self::Row(row) => Some(row),
            Self::Line(_) => None,
        }
    }
}
