//! Per-page result cache
//!
//! One slot per panel position, each holding the last value, the last
//! exception and the time of the last run. Slots are only ever replaced
//! whole.
//!
//! # Run sequencing
//!
//! Runs are last-started-wins. [`PageResults::begin_run`] hands out a
//! [`RunTicket`]; [`PageResults::complete`] applies an outcome only if the
//! ticket is still the latest one held by the slot at its index. Starting a
//! newer run replaces the held ticket. An edit clears the held ticket of
//! every slot whose position changed (and of a replaced slot), so a run
//! started for the old layout is dropped. Slots an edit does not shift keep
//! their in-flight runs.
//!
//! # Failure policy
//!
//! A failed run records its exception and run time and keeps the value of
//! the previous successful run. Dependency reads ([`CacheView`]) treat a
//! failed slot as absent.

use crate::error::EvalError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

/// Result slot for one panel
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelResult {
    /// Value of the last successful run
    pub value: Option<Value>,
    /// Message of the last run, if it failed
    pub exception: Option<String>,
    /// When the last run finished
    pub last_run: Option<DateTime<Utc>>,
}

impl PanelResult {
    /// Whether the panel has ever run
    #[inline]
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.last_run.is_some()
    }

    /// Whether the last run failed
    #[inline]
    #[must_use]
    pub fn failed(&self) -> bool {
        self.exception.is_some()
    }

    /// Value usable by downstream panels: present only after a successful
    /// last run
    #[inline]
    #[must_use]
    pub fn succeeded_value(&self) -> Option<&Value> {
        if self.failed() {
            None
        } else {
            self.value.as_ref()
        }
    }
}

/// Proof that a run was started, needed to record its outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    index: usize,
    seq: u64,
}

impl RunTicket {
    /// Panel position the run belongs to
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Page-wide start order of the run
    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Read-only snapshot of resolvable values, taken when a run starts
#[derive(Debug, Clone, Default)]
pub struct CacheView {
    values: Vec<Option<Value>>,
}

impl CacheView {
    /// View over explicit values
    #[must_use]
    pub fn from_values(values: Vec<Option<Value>>) -> Self {
        Self { values }
    }

    /// Resolved value at `index`, if any
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Resolved value at `index` when `index` is strictly before `reader`
    #[inline]
    #[must_use]
    pub fn get_before(&self, index: usize, reader: usize) -> Option<&Value> {
        if index < reader {
            self.get(index)
        } else {
            None
        }
    }

    /// Number of slots covered
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the view covers no slots
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Default)]
struct Slot {
    result: PanelResult,
    latest_seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    slots: Vec<Slot>,
    next_seq: u64,
}

impl Inner {
    /// Forget in-flight runs of the slots in `range`
    fn detach(&mut self, range: std::ops::Range<usize>) {
        let end = range.end.min(self.slots.len());
        for slot in &mut self.slots[range.start.min(end)..end] {
            slot.latest_seq = 0;
        }
    }
}

/// Result cache of one page
#[derive(Debug, Default)]
pub struct PageResults {
    inner: RwLock<Inner>,
}

impl PageResults {
    /// Cache with `len` empty slots
    #[must_use]
    pub fn new(len: usize) -> Self {
        let mut inner = Inner::default();
        inner.slots.resize_with(len, Slot::default);
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Number of slots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    /// Whether there are no slots
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the slot at `index` (empty when out of range)
    #[must_use]
    pub fn get(&self, index: usize) -> PanelResult {
        self.inner
            .read()
            .slots
            .get(index)
            .map(|s| s.result.clone())
            .unwrap_or_default()
    }

    /// Copy of every slot
    #[must_use]
    pub fn snapshot(&self) -> Vec<PanelResult> {
        self.inner.read().slots.iter().map(|s| s.result.clone()).collect()
    }

    /// Resolvable values for dependency reads
    #[must_use]
    pub fn view(&self) -> CacheView {
        let inner = self.inner.read();
        CacheView {
            values: inner.slots.iter().map(|s| s.result.succeeded_value().cloned()).collect(),
        }
    }

    /// Start a run of `index`, superseding any run of it still in flight
    ///
    /// # Errors
    /// - `EvalError::PanelOutOfRange` if there is no slot at `index`
    pub fn begin_run(&self, index: usize) -> Result<RunTicket, EvalError> {
        let mut inner = self.inner.write();
        let len = inner.slots.len();
        if index >= len {
            return Err(EvalError::PanelOutOfRange { index, len });
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.slots[index].latest_seq = seq;
        Ok(RunTicket { index, seq })
    }

    /// Record the outcome of a run
    ///
    /// Returns `false` (and changes nothing) if the run was superseded.
    pub fn complete(&self, ticket: RunTicket, outcome: Result<Value, EvalError>) -> bool {
        let mut inner = self.inner.write();
        let Some(slot) = inner.slots.get_mut(ticket.index) else {
            tracing::debug!(index = ticket.index, "dropping run for a removed slot");
            return false;
        };
        if slot.latest_seq != ticket.seq {
            tracing::debug!(
                index = ticket.index,
                seq = ticket.seq,
                latest = slot.latest_seq,
                "dropping superseded run"
            );
            return false;
        }

        let now = Utc::now();
        slot.result = match outcome {
            Ok(value) => PanelResult {
                value: Some(value),
                exception: None,
                last_run: Some(now),
            },
            Err(e) => PanelResult {
                value: slot.result.value.take(),
                exception: Some(e.to_string()),
                last_run: Some(now),
            },
        };
        true
    }

    /// Add an empty slot at `index`, shifting later slots
    pub fn insert_slot(&self, index: usize) {
        let mut inner = self.inner.write();
        let at = index.min(inner.slots.len());
        inner.slots.insert(at, Slot::default());
        let len = inner.slots.len();
        inner.detach(at + 1..len);
    }

    /// Drop the slot at `index`, shifting later slots
    pub fn remove_slot(&self, index: usize) {
        let mut inner = self.inner.write();
        if index < inner.slots.len() {
            inner.slots.remove(index);
            let len = inner.slots.len();
            inner.detach(index..len);
        }
    }

    /// Move the slot at `from` to `to`, following its panel
    pub fn move_slot(&self, from: usize, to: usize) {
        let mut inner = self.inner.write();
        let len = inner.slots.len();
        if from < len && to < len && from != to {
            let slot = inner.slots.remove(from);
            inner.slots.insert(to, slot);
            inner.detach(from.min(to)..from.max(to) + 1);
        }
    }

    /// Empty the slot at `index` (the panel was replaced)
    pub fn reset_slot(&self, index: usize) {
        let mut inner = self.inner.write();
        if let Some(slot) = inner.slots.get_mut(index) {
            slot.result = PanelResult::default();
            slot.latest_seq = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_slots_have_not_run() {
        let cache = PageResults::new(3);
        assert_eq!(cache.len(), 3);
        let slot = cache.get(1);
        assert!(!slot.has_run());
        assert!(!slot.failed());
        assert!(cache.view().get(1).is_none());
        assert!(!cache.get(7).has_run());
    }

    #[test]
    fn success_then_failure_keeps_value() {
        let cache = PageResults::new(1);

        let ticket = cache.begin_run(0).unwrap();
        assert!(cache.complete(ticket, Ok(json!([1, 2]))));
        assert_eq!(cache.view().get(0), Some(&json!([1, 2])));

        let ticket = cache.begin_run(0).unwrap();
        assert!(cache.complete(ticket, Err(EvalError::Transport("refused".to_string()))));

        let slot = cache.get(0);
        assert_eq!(slot.value, Some(json!([1, 2])));
        assert_eq!(slot.exception.as_deref(), Some("http request failed: refused"));
        assert!(slot.has_run());
        assert!(cache.view().get(0).is_none());
    }

    #[test]
    fn success_clears_exception() {
        let cache = PageResults::new(1);
        let ticket = cache.begin_run(0).unwrap();
        cache.complete(ticket, Err(EvalError::Sql("boom".to_string())));
        let ticket = cache.begin_run(0).unwrap();
        cache.complete(ticket, Ok(json!(1)));
        assert!(!cache.get(0).failed());
    }

    #[test]
    fn last_started_run_wins() {
        let cache = PageResults::new(1);
        let first = cache.begin_run(0).unwrap();
        let second = cache.begin_run(0).unwrap();
        assert!(second.seq() > first.seq());

        assert!(cache.complete(second, Ok(json!("second"))));
        assert!(!cache.complete(first, Ok(json!("first"))));
        assert_eq!(cache.get(0).value, Some(json!("second")));
    }

    #[test]
    fn failure_does_not_touch_other_slots() {
        let cache = PageResults::new(2);
        let t0 = cache.begin_run(0).unwrap();
        let t1 = cache.begin_run(1).unwrap();
        cache.complete(t0, Ok(json!("ok")));
        cache.complete(t1, Err(EvalError::Script("bad".to_string())));

        assert_eq!(cache.get(0).value, Some(json!("ok")));
        assert!(!cache.get(0).failed());
        assert!(cache.get(1).failed());
    }

    #[test]
    fn structural_edit_drops_in_flight_runs() {
        let cache = PageResults::new(2);
        let ticket = cache.begin_run(1).unwrap();
        cache.insert_slot(0);
        assert!(!cache.complete(ticket, Ok(json!(1))));
        assert_eq!(cache.len(), 3);
        assert!(!cache.get(2).has_run());
    }

    #[test]
    fn edits_keep_runs_of_unshifted_slots() {
        let cache = PageResults::new(4);
        let first = cache.begin_run(0).unwrap();
        let last = cache.begin_run(3).unwrap();

        cache.reset_slot(2);
        cache.insert_slot(2);
        cache.remove_slot(4);
        cache.move_slot(1, 2);

        assert!(cache.complete(first, Ok(json!("kept"))));
        assert_eq!(cache.get(0).value, Some(json!("kept")));
        assert!(!cache.complete(last, Ok(json!("shifted"))));
        assert!(cache.snapshot().iter().skip(1).all(|s| !s.has_run()));
    }

    #[test]
    fn reset_drops_run_of_replaced_slot() {
        let cache = PageResults::new(2);
        let ticket = cache.begin_run(1).unwrap();
        cache.reset_slot(1);
        assert!(!cache.complete(ticket, Ok(json!(1))));
        assert!(!cache.get(1).has_run());
    }

    #[test]
    fn move_slot_follows_panel() {
        let cache = PageResults::new(3);
        let ticket = cache.begin_run(0).unwrap();
        cache.complete(ticket, Ok(json!("first")));

        cache.move_slot(0, 2);
        assert_eq!(cache.get(2).value, Some(json!("first")));
        assert!(!cache.get(0).has_run());

        cache.remove_slot(2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn begin_run_out_of_range() {
        let cache = PageResults::new(1);
        assert!(matches!(
            cache.begin_run(3),
            Err(EvalError::PanelOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn view_respects_reader_position() {
        let view = CacheView::from_values(vec![Some(json!(0)), Some(json!(1)), None]);
        assert_eq!(view.get_before(0, 1), Some(&json!(0)));
        assert_eq!(view.get_before(1, 1), None);
        assert_eq!(view.get_before(2, 5), None);
        assert_eq!(view.get_before(9, 10), None);
    }

    #[test]
    fn panel_result_serializes_for_presentation() {
        let value = serde_json::to_value(PanelResult::default()).unwrap();
        assert_eq!(value, json!({"value": null, "exception": null, "lastRun": null}));
    }
}
