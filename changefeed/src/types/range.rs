use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical name of a change stream, for example `keyspace.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque identity of a feed range, stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeId(String);

impl RangeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RangeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RangeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One independently ordered and independently resumable slice of a target's change stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedRange {
    pub target: TargetId,
    pub range: RangeId,
}

impl FeedRange {
    pub fn new(target: impl Into<TargetId>, range: impl Into<RangeId>) -> Self {
        Self {
            target: target.into(),
            range: range.into(),
        }
    }
}

impl fmt::Display for FeedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.range)
    }
}
