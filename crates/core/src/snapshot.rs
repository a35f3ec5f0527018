//! Snapshot metadata records

use crate::policy::Bucket;
use chrono::{DateTime, FixedOffset, SubsecRound};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// ISO-8601 with microseconds and a numeric offset, e.g.
/// `2024-03-01T14:00:00.000123+01:00`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

/// Retention classification of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotType {
    /// First snapshot of a volume; never expires
    Init,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Operator-requested; never expires
    Manual,
}

impl SnapshotType {
    /// Retention bucket, or `None` for the exempt `init`/`manual` types.
    pub fn bucket(self) -> Option<Bucket> {
        match self {
            SnapshotType::Hourly => Some(Bucket::Hourly),
            SnapshotType::Daily => Some(Bucket::Daily),
            SnapshotType::Weekly => Some(Bucket::Weekly),
            SnapshotType::Monthly => Some(Bucket::Monthly),
            SnapshotType::Yearly => Some(Bucket::Yearly),
            SnapshotType::Init | SnapshotType::Manual => None,
        }
    }

    /// Exempt from count- and age-based expiry.
    pub fn is_protected(self) -> bool {
        self.bucket().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotType::Init => "init",
            SnapshotType::Hourly => "hourly",
            SnapshotType::Daily => "daily",
            SnapshotType::Weekly => "weekly",
            SnapshotType::Monthly => "monthly",
            SnapshotType::Yearly => "yearly",
            SnapshotType::Manual => "manual",
        }
    }
}

impl From<Bucket> for SnapshotType {
    fn from(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Hourly => SnapshotType::Hourly,
            Bucket::Daily => SnapshotType::Daily,
            Bucket::Weekly => SnapshotType::Weekly,
            Bucket::Monthly => SnapshotType::Monthly,
            Bucket::Yearly => SnapshotType::Yearly,
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(SnapshotType::Init),
            "manual" => Ok(SnapshotType::Manual),
            other => other.parse::<Bucket>().map(SnapshotType::from),
        }
    }
}

/// Metadata for one point-in-time copy of a volume
///
/// Immutable once created; ordering within a volume is by `created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    name: String,
    path: PathBuf,
    #[serde(rename = "creation-date-time", with = "iso_micros")]
    created: DateTime<FixedOffset>,
    #[serde(rename = "type")]
    kind: SnapshotType,
}

impl SnapshotRecord {
    /// Build the record for a snapshot of `volume` taken at `created`,
    /// stored beneath `storage_dir`.
    ///
    /// `created` is truncated to the persisted microsecond precision.
    pub fn new(
        volume: &str,
        storage_dir: &Path,
        created: DateTime<FixedOffset>,
        kind: SnapshotType,
    ) -> Self {
        let created = created.trunc_subsecs(6);
        let name = snapshot_name(volume, &created);
        let path = storage_dir.join(&name);
        Self {
            name,
            path,
            created,
            kind,
        }
    }

    /// Reassemble a record from persisted parts.
    pub fn from_parts(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        created: DateTime<FixedOffset>,
        kind: SnapshotType,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            created,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created(&self) -> DateTime<FixedOffset> {
        self.created
    }

    pub fn kind(&self) -> SnapshotType {
        self.kind
    }
}

/// Snapshot name: `<volume>-<timestamp>` with microsecond precision.
pub fn snapshot_name(volume: &str, created: &DateTime<FixedOffset>) -> String {
    format!("{}-{}", volume, format_timestamp(created))
}

pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
}

mod iso_micros {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_record_naming() {
        let created = ts("2024-03-01T14:00:00.000123+01:00");
        let rec = SnapshotRecord::new("home", Path::new("/home/.snapshots"), created, SnapshotType::Hourly);

        assert_eq!(rec.name(), "home-2024-03-01T14:00:00.000123+01:00");
        assert_eq!(
            rec.path(),
            Path::new("/home/.snapshots/home-2024-03-01T14:00:00.000123+01:00")
        );
    }

    #[test]
    fn test_timestamp_keeps_microseconds() {
        let created = ts("2024-03-01T14:00:00.5+00:00");
        assert_eq!(format_timestamp(&created), "2024-03-01T14:00:00.500000+00:00");
    }

    #[test]
    fn test_new_truncates_to_microseconds() {
        let created = ts("2024-03-01T14:00:00.123456789+00:00");
        let rec = SnapshotRecord::new("v", Path::new("/v/.snapshots"), created, SnapshotType::Daily);
        assert_eq!(rec.created(), ts("2024-03-01T14:00:00.123456+00:00"));
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!("init".parse::<SnapshotType>().unwrap(), SnapshotType::Init);
        assert_eq!("weekly".parse::<SnapshotType>().unwrap(), SnapshotType::Weekly);
        assert!("minutely".parse::<SnapshotType>().is_err());
    }

    #[test]
    fn test_protected_types() {
        assert!(SnapshotType::Init.is_protected());
        assert!(SnapshotType::Manual.is_protected());
        assert!(!SnapshotType::Daily.is_protected());
    }

    #[test]
    fn test_record_serde_field_names() {
        let created = ts("2024-03-01T14:00:00.000001+00:00");
        let rec = SnapshotRecord::new("data", Path::new("/data/.snapshots"), created, SnapshotType::Init);
        let json = serde_json::to_value(&rec).unwrap();

        assert_eq!(json["type"], "init");
        assert_eq!(json["creation-date-time"], "2024-03-01T14:00:00.000001+00:00");

        let back: SnapshotRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }
}
