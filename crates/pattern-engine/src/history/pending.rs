//! Ledger appends staged inside a store transaction.
//!
//! The history writes travel in the same [`WriteBatch`] as the pattern
//! changes they describe. The ledger stays locked while the batch is in
//! flight and its in-memory state changes only after the batch commits.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use pattern_core::events::{HistoryPrunedEvent, HistoryRecordedEvent};
use pattern_core::types::{PatternCategory, PatternHistory, PatternHistoryEvent};
use pattern_storage::{Mutation, WriteBatch};
use tokio::sync::MutexGuard;

use super::{insert_event, HistoryLedger, LedgerState, PruneReport};

pub(crate) struct PendingHistory<'a> {
    ledger: &'a HistoryLedger,
    state: MutexGuard<'a, LedgerState>,
    /// Post-append view of each touched history. `None` once retention
    /// emptied it.
    touched: BTreeMap<String, Option<PatternHistory>>,
    recorded: Vec<PatternHistoryEvent>,
    pruned: PruneReport,
    now: DateTime<Utc>,
}

impl<'a> PendingHistory<'a> {
    pub(super) fn new(
        ledger: &'a HistoryLedger,
        state: MutexGuard<'a, LedgerState>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ledger,
            state,
            touched: BTreeMap::new(),
            recorded: Vec::new(),
            pruned: PruneReport::default(),
            now,
        }
    }

    pub(crate) fn push(&mut self, category: PatternCategory, event: PatternHistoryEvent) {
        let pattern_id = event.pattern_id.clone();
        let slot = match self.touched.entry(pattern_id.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(self.state.histories.get(&pattern_id).cloned()),
        };
        let history = slot
            .get_or_insert_with(|| PatternHistory::new(pattern_id, category, event.timestamp));
        self.pruned.events_removed +=
            insert_event(history, event.clone(), &self.ledger.policy, self.now);
        if history.events.is_empty() {
            *slot = None;
            self.pruned.histories_removed += 1;
        }
        self.recorded.push(event);
    }

    /// Writes for every touched history, plus any history still dirty from
    /// an earlier failed write.
    pub(crate) fn mutations(&self) -> WriteBatch {
        let mut ids: BTreeSet<&String> = self.touched.keys().collect();
        ids.extend(self.state.dirty.iter());
        ids.into_iter()
            .map(|id| {
                let history = match self.touched.get(id) {
                    Some(staged) => staged.as_ref(),
                    None => self.state.histories.get(id),
                };
                match history {
                    Some(h) => Mutation::PutHistory(h.clone()),
                    None => Mutation::DeleteHistory {
                        pattern_id: id.clone(),
                    },
                }
            })
            .collect()
    }

    /// Fold the staged histories into the ledger and notify observers. Call
    /// only after the batch carrying [`Self::mutations`] has committed.
    pub(crate) fn commit(self) {
        let PendingHistory {
            ledger,
            mut state,
            touched,
            recorded,
            pruned,
            ..
        } = self;
        for (id, history) in touched {
            match history {
                Some(history) => {
                    state.histories.insert(id, history);
                }
                None => {
                    state.histories.remove(&id);
                }
            }
        }
        state.dirty.clear();
        drop(state);

        for event in &recorded {
            ledger.events.emit_history_recorded(&HistoryRecordedEvent {
                pattern_id: event.pattern_id.clone(),
                event_id: event.id.clone(),
                event_type: event.event_type,
            });
        }
        if pruned.events_removed > 0 {
            ledger.events.emit_history_pruned(&HistoryPrunedEvent {
                events_removed: pruned.events_removed,
                histories_removed: pruned.histories_removed,
            });
        }
    }
}
