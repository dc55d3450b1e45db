//! Daily snapshots with a retention cap, and trends between them.

pub mod trends;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use pattern_core::config::{SnapshotConfig, TrendThresholds};
use pattern_core::errors::SnapshotError;
use pattern_core::events::{EventDispatcher, SnapshotCreatedEvent};
use pattern_core::tracing::metrics;
use pattern_core::types::{Pattern, PatternTrend, Snapshot};
use pattern_storage::{Mutation, StorageBackend, WriteBatch};
use tokio::sync::Mutex;

pub use self::trends::{calculate_trends, summarize, TrendDirection, TrendSummary};

/// The newest snapshot compared against the one before it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendReport {
    pub current: NaiveDate,
    pub previous: NaiveDate,
    pub trends: Vec<PatternTrend>,
    pub summary: TrendSummary,
}

pub struct SnapshotEngine {
    backend: Arc<dyn StorageBackend>,
    max_snapshots: usize,
    thresholds: TrendThresholds,
    events: Arc<EventDispatcher>,
    /// Serializes capture and eviction.
    write: Mutex<()>,
}

impl SnapshotEngine {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        config: &SnapshotConfig,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            backend,
            max_snapshots: config.effective_max_snapshots(),
            thresholds: config.trend_thresholds(),
            events,
            write: Mutex::new(()),
        }
    }

    pub fn thresholds(&self) -> &TrendThresholds {
        &self.thresholds
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    /// Capture `patterns` under today's UTC date.
    pub async fn create_snapshot(&self, patterns: &[Pattern]) -> Result<Snapshot, SnapshotError> {
        self.create_snapshot_for(Utc::now().date_naive(), patterns).await
    }

    /// Capture `patterns` under `date`, replacing any snapshot already stored
    /// for that date, and evict the oldest snapshots beyond the cap.
    pub async fn create_snapshot_for(
        &self,
        date: NaiveDate,
        patterns: &[Pattern],
    ) -> Result<Snapshot, SnapshotError> {
        let guard = self.write.lock().await;
        let snapshot = Snapshot::capture(date, Utc::now(), patterns);

        let mut dates = self.backend.snapshot_dates()?;
        if let Err(at) = dates.binary_search(&date) {
            dates.insert(at, date);
        }
        let excess = dates.len().saturating_sub(self.max_snapshots);

        let mut batch = WriteBatch::new();
        batch.push(Mutation::PutSnapshot(snapshot.clone()));
        for evicted in &dates[..excess] {
            batch.push(Mutation::DeleteSnapshot { date: *evicted });
        }
        self.backend.apply(&batch)?;
        drop(guard);

        tracing::info!(
            { metrics::SNAPSHOT_DATE } = tracing::field::display(date),
            patterns = snapshot.summary.total_patterns,
            evicted = excess,
            "snapshot created"
        );
        self.events.emit_snapshot_created(&SnapshotCreatedEvent {
            date,
            total_patterns: snapshot.summary.total_patterns,
            overall_compliance_rate: snapshot.summary.overall_compliance_rate,
            snapshots_evicted: excess,
        });
        Ok(snapshot)
    }

    pub async fn get(&self, date: NaiveDate) -> Result<Snapshot, SnapshotError> {
        self.backend
            .load_snapshot(date)?
            .ok_or_else(|| SnapshotError::NotFound {
                date: date.to_string(),
            })
    }

    pub async fn latest(&self) -> Result<Option<Snapshot>, SnapshotError> {
        match self.backend.snapshot_dates()?.last() {
            Some(date) => Ok(self.backend.load_snapshot(*date)?),
            None => Ok(None),
        }
    }

    /// The newest snapshot strictly before `date`.
    pub async fn previous_before(
        &self,
        date: NaiveDate,
    ) -> Result<Option<Snapshot>, SnapshotError> {
        let dates = self.backend.snapshot_dates()?;
        match dates.iter().rev().find(|d| **d < date) {
            Some(d) => Ok(self.backend.load_snapshot(*d)?),
            None => Ok(None),
        }
    }

    /// Stored dates, oldest first.
    pub async fn list_dates(&self) -> Result<Vec<NaiveDate>, SnapshotError> {
        Ok(self.backend.snapshot_dates()?)
    }

    pub fn calculate_trends(&self, current: &Snapshot, previous: &Snapshot) -> Vec<PatternTrend> {
        let trends = calculate_trends(current, previous, &self.thresholds);
        tracing::debug!(
            { metrics::SNAPSHOT_DATE } = tracing::field::display(current.date),
            { metrics::TREND_COUNT } = trends.len(),
            "trends calculated"
        );
        trends
    }

    pub fn trend_summary(&self, trends: &[PatternTrend]) -> TrendSummary {
        summarize(trends)
    }

    /// Trends from the snapshot before the latest to the latest. `None`
    /// until two snapshots exist.
    pub async fn latest_trends(&self) -> Result<Option<TrendReport>, SnapshotError> {
        let Some(current) = self.latest().await? else {
            return Ok(None);
        };
        let Some(previous) = self.previous_before(current.date).await? else {
            return Ok(None);
        };
        let trends = self.calculate_trends(&current, &previous);
        let summary = summarize(&trends);
        Ok(Some(TrendReport {
            current: current.date,
            previous: previous.date,
            trends,
            summary,
        }))
    }
}
