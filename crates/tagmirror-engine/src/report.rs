//! Per-run outcome records.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tagmirror_core::MirrorOutcome;
use uuid::Uuid;

/// Tag recorded for outcomes that concern a whole image.
pub const IMAGE_LEVEL_TAG: &str = "-";

/// Outcome of one (image, tag) decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    /// Image name from the configuration.
    pub image: String,
    /// Source repository.
    pub source: String,
    /// Destination repository.
    pub destination: String,
    /// Tag, or [`IMAGE_LEVEL_TAG`].
    pub tag: String,
    /// What happened.
    pub outcome: MirrorOutcome,
    /// Failure message for [`MirrorOutcome::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a run decided.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    counts: IndexMap<MirrorOutcome, usize>,
    records: Vec<TagRecord>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    /// Starts a report with a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: None,
            counts: MirrorOutcome::ALL.into_iter().map(|o| (o, 0)).collect(),
            records: Vec::new(),
        }
    }

    /// Run identifier.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the run started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the run finished, if it has.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Records, in decision order.
    #[must_use]
    pub fn records(&self) -> &[TagRecord] {
        &self.records
    }

    /// Adds a record.
    pub fn record(&mut self, record: TagRecord) {
        *self.counts.entry(record.outcome).or_default() += 1;
        self.records.push(record);
    }

    /// Marks the run finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Number of records with `outcome`.
    #[must_use]
    pub fn count(&self, outcome: MirrorOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or_default()
    }

    /// Returns true if any decision failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.count(MirrorOutcome::Error) > 0
    }

    /// (tag, outcome) pairs recorded for one image, in decision order.
    #[must_use]
    pub fn outcomes_for(&self, image: &str) -> Vec<(&str, MirrorOutcome)> {
        self.records
            .iter()
            .filter(|r| r.image == image)
            .map(|r| (r.tag.as_str(), r.outcome))
            .collect()
    }

    /// One-line count summary, e.g. `copied=2 replaced=0 ...`.
    #[must_use]
    pub fn summary(&self) -> String {
        self.counts
            .iter()
            .map(|(outcome, count)| format!("{outcome}={count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
