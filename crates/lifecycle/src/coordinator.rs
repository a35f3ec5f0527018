//! Run coordinator: applies one invocation's context to every volume
//!
//! Volumes are processed one after another in config order. A failure in one
//! volume is recorded in its report and never stops the others.

use crate::manager::{Dedup, VolumeManager};
use crate::report::RunSummary;
use chrono::{DateTime, FixedOffset};
use sbm_core::snapshot::format_timestamp;
use sbm_core::RunContext;
use sbm_journal::ConfigStore;
use tracing::{info, info_span, Instrument};

pub struct RunCoordinator<'m, 'a> {
    manager: &'m VolumeManager<'a>,
    dedup: Dedup,
}

impl<'m, 'a> RunCoordinator<'m, 'a> {
    pub fn new(manager: &'m VolumeManager<'a>) -> Self {
        Self {
            manager,
            dedup: Dedup::SkipSamePeriod,
        }
    }

    pub fn with_dedup(mut self, dedup: Dedup) -> Self {
        self.dedup = dedup;
        self
    }

    /// Run a cycle for every configured volume.
    pub async fn run(
        &self,
        store: &mut ConfigStore,
        context: RunContext,
        now: DateTime<FixedOffset>,
    ) -> RunSummary {
        let names = store.names();
        self.run_volumes(store, &names, context, now).await
    }

    /// Run a cycle for the named volumes only, in the given order.
    pub async fn run_volumes(
        &self,
        store: &mut ConfigStore,
        names: &[String],
        context: RunContext,
        now: DateTime<FixedOffset>,
    ) -> RunSummary {
        info!(%context, volumes = names.len(), "starting run");

        let mut volumes = Vec::with_capacity(names.len());
        for name in names {
            let span = info_span!("volume", volume = %name);
            let report = self
                .manager
                .run_cycle(store, name, context, now, self.dedup)
                .instrument(span)
                .await;
            volumes.push(report);
        }

        let summary = RunSummary {
            context: context.to_string(),
            started: format_timestamp(&now),
            volumes,
        };
        info!(
            %context,
            failed = summary.failed().count(),
            "run finished"
        );
        summary
    }
}
