//! Per-volume and per-run outcome reporting

use sbm_core::{Error, SnapshotType};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

/// Volume manager states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    Idle,
    Creating,
    /// Sending the new snapshot's stream offsite
    Uploading,
    Pruning,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Idle => "idle",
            CycleState::Creating => "creating",
            CycleState::Uploading => "uploading",
            CycleState::Pruning => "pruning",
            CycleState::Persisting => "persisting",
            CycleState::Done => "done",
            CycleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A failed transition and its originating cause
#[derive(Debug)]
pub struct Failure {
    /// State the cycle was in when it failed
    pub stage: CycleState,
    pub cause: Error,
}

impl Serialize for Failure {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut st = s.serialize_struct("Failure", 3)?;
        st.serialize_field("stage", &self.stage)?;
        st.serialize_field("kind", self.cause.kind())?;
        st.serialize_field("message", &self.cause.to_string())?;
        st.end()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} while {}: {}", self.cause.kind(), self.stage, self.cause)
    }
}

/// Outcome of one volume's cycle
#[derive(Debug, Serialize)]
pub struct VolumeReport {
    pub volume: String,
    /// `Done` or `Failed`
    pub state: CycleState,
    pub created: Option<CreatedSnapshot>,
    /// Creation skipped because this period already has a snapshot
    pub skipped_creation: bool,
    /// Remote identifier of the uploaded stream
    pub uploaded: Option<String>,
    /// Snapshots deleted, oldest first
    pub deleted: Vec<String>,
    /// Selected for deletion but still present
    pub remaining: Vec<String>,
    pub persisted: bool,
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SnapshotType,
}

impl VolumeReport {
    pub fn new(volume: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            state: CycleState::Idle,
            created: None,
            skipped_creation: false,
            uploaded: None,
            deleted: Vec::new(),
            remaining: Vec::new(),
            persisted: false,
            failures: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, stage: CycleState, cause: Error) {
        self.failures.push(Failure { stage, cause });
        self.state = CycleState::Failed;
    }

    pub fn is_success(&self) -> bool {
        self.state == CycleState::Done
    }
}

/// Aggregated result of one invocation
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Declared granularity, e.g. `hourly` or `manual`
    pub context: String,
    pub started: String,
    pub volumes: Vec<VolumeReport>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.volumes.iter().all(VolumeReport::is_success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &VolumeReport> {
        self.volumes.iter().filter(|v| !v.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_marks_report_failed() {
        let mut report = VolumeReport::new("home");
        report.state = CycleState::Done;
        assert!(report.is_success());

        report.fail(CycleState::Pruning, Error::VolumeNotFound("home".into()));
        assert!(!report.is_success());
        assert_eq!(report.state, CycleState::Failed);
    }

    #[test]
    fn test_failure_serializes_kind_and_stage() {
        let failure = Failure {
            stage: CycleState::Persisting,
            cause: Error::PersistenceFailed {
                path: "/etc/conf.d/btrfs-sbm.toml".into(),
                message: "disk full".into(),
            },
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["stage"], "persisting");
        assert_eq!(json["kind"], "PersistenceFailed");
    }
}
