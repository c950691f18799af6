// ============================================================================
// spark-properties - Bulk Transaction Coordinator
// Sequences FINALIZE and NOTIFY across many deferred values
// ============================================================================
//
// When a bulk update (e.g. applying a saved snapshot) ends, every value in
// scope has a pending write. Finalizing and notifying them in arbitrary
// order could let a listener observe a half-applied state, so callers
// declare order dependencies ahead of time and the coordinator runs passes:
//
// 1. Finalize every pending value whose FINALIZE prerequisites are done
// 2. Notify every finalized value whose NOTIFY prerequisites are done
// 3. Repeat until nothing is pending
//
// Only values in scope gate each other. A pass without progress, or more
// passes than the configured limit, is reported as
// `UnsatisfiableConstraints` in every build profile.
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::coordination::order::{pair_index, OrderDependencyMapPair, Phase};
use crate::core::constants::DEFAULT_PASS_LIMIT;
use crate::core::error::{PropertyError, Result};
use crate::core::types::{Deferrable, Notifier, PropertyId};

// =============================================================================
// OPTIONS & REPORT
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Passes allowed before a transaction is declared unsatisfiable
    pub pass_limit: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            pass_limit: DEFAULT_PASS_LIMIT,
        }
    }
}

impl CoordinatorOptions {
    pub fn pass_limit(mut self, limit: usize) -> Self {
        self.pass_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pass_limit == 0 {
            return Err(PropertyError::invalid_argument(
                "coordinator",
                "pass_limit must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// What a completed transaction did, in order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionReport {
    /// Every applied (value, phase), in application order
    pub applied: Vec<(PropertyId, Phase)>,
    /// Passes taken
    pub passes: usize,
}

impl TransactionReport {
    /// Position of `(value, phase)` in the application order
    pub fn position(&self, value: PropertyId, phase: Phase) -> Option<usize> {
        self.applied.iter().position(|entry| *entry == (value, phase))
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Ordering solver for the end of bulk transactions.
///
/// Constructed and passed explicitly; there is no global instance.
///
/// # Example
///
/// ```
/// use spark_properties::{BulkTransactionCoordinator, Phase, Property};
///
/// let mut coordinator = BulkTransactionCoordinator::new();
/// let x = Property::new(0);
/// let y = Property::new(0);
/// coordinator
///     .register_order_dependency(x.id(), Phase::Notify, y.id(), Phase::Finalize)
///     .unwrap();
///
/// x.set_deferred(true).unwrap();
/// y.set_deferred(true).unwrap();
/// x.set(1).unwrap();
/// y.set(2).unwrap();
///
/// let report = coordinator
///     .run_transaction(&[x.as_deferrable(), y.as_deferrable()])
///     .unwrap();
/// assert!(report.position(x.id(), Phase::Notify) < report.position(y.id(), Phase::Finalize));
/// assert_eq!((x.get(), y.get()), (1, 2));
/// ```
#[derive(Debug)]
pub struct BulkTransactionCoordinator {
    options: CoordinatorOptions,
    pairs: [OrderDependencyMapPair; 4],
}

impl Default for BulkTransactionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkTransactionCoordinator {
    pub fn new() -> Self {
        Self {
            options: CoordinatorOptions::default(),
            pairs: [
                OrderDependencyMapPair::new(Phase::Finalize, Phase::Finalize),
                OrderDependencyMapPair::new(Phase::Finalize, Phase::Notify),
                OrderDependencyMapPair::new(Phase::Notify, Phase::Finalize),
                OrderDependencyMapPair::new(Phase::Notify, Phase::Notify),
            ],
        }
    }

    pub fn with_options(options: CoordinatorOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            ..Self::new()
        })
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.options
    }

    fn pair(&self, before: Phase, after: Phase) -> &OrderDependencyMapPair {
        &self.pairs[pair_index(before, after)]
    }

    // =========================================================================
    // CONSTRAINTS
    // =========================================================================

    /// Require `before_phase` of `before` to complete before `after_phase`
    /// of `after` begins.
    ///
    /// A value constrained against itself is rejected for the same phase,
    /// and for NOTIFY before FINALIZE (its own finalize always comes first).
    pub fn register_order_dependency(
        &mut self,
        before: PropertyId,
        before_phase: Phase,
        after: PropertyId,
        after_phase: Phase,
    ) -> Result<()> {
        if before == after {
            if before_phase == after_phase {
                return Err(PropertyError::invalid_argument(
                    before.to_string(),
                    format!("{before_phase} cannot be ordered before itself"),
                ));
            }
            if before_phase == Phase::Notify {
                return Err(PropertyError::invalid_argument(
                    before.to_string(),
                    "notify cannot precede its own finalize",
                ));
            }
        }
        let added = self.pairs[pair_index(before_phase, after_phase)].add(before, after);
        tracing::debug!(
            before = %before,
            before_phase = %before_phase,
            after = %after,
            after_phase = %after_phase,
            added,
            "order dependency registered"
        );
        Ok(())
    }

    /// Purge every constraint mentioning `value`; returns how many went
    pub fn unregister_order_dependencies(&mut self, value: PropertyId) -> usize {
        let removed: usize = self.pairs.iter_mut().map(|pair| pair.remove_value(value)).sum();
        if removed > 0 {
            tracing::debug!(value = %value, removed, "order dependencies unregistered");
        }
        removed
    }

    /// Number of registered constraints
    pub fn constraint_count(&self) -> usize {
        self.pairs.iter().map(OrderDependencyMapPair::len).sum()
    }

    pub fn clear(&mut self) {
        for pair in &mut self.pairs {
            pair.clear();
        }
    }

    // =========================================================================
    // TRANSACTION
    // =========================================================================

    /// Finalize and notify every value in `values`, honoring the registered
    /// order dependencies.
    ///
    /// Every value must be deferred and appear once. Errors from a value's
    /// own finalize or notify, and deadlocks, stop the transaction
    /// immediately. Values already finalized are still announced before the
    /// error is returned; values not yet reached stay deferred.
    pub fn run_transaction(&self, values: &[Rc<dyn Deferrable>]) -> Result<TransactionReport> {
        let mut scope: HashSet<PropertyId> = HashSet::with_capacity(values.len());
        let mut names: HashMap<PropertyId, String> = HashMap::with_capacity(values.len());
        for value in values {
            let id = value.property_id();
            if !scope.insert(id) {
                return Err(PropertyError::invalid_argument(
                    value.name(),
                    "appears more than once in the transaction",
                ));
            }
            if !value.is_deferred() {
                return Err(PropertyError::invalid_state(
                    value.name(),
                    "must be deferred before the transaction runs",
                ));
            }
            names.insert(id, value.name());
        }

        let mut notifiers: Vec<(PropertyId, Notifier)> = Vec::new();
        let outcome = self.apply(values, &scope, &names, &mut notifiers);
        if outcome.is_err() {
            announce_stranded(notifiers);
        }
        outcome
    }

    fn apply(
        &self,
        values: &[Rc<dyn Deferrable>],
        scope: &HashSet<PropertyId>,
        names: &HashMap<PropertyId, String>,
        notifiers: &mut Vec<(PropertyId, Notifier)>,
    ) -> Result<TransactionReport> {
        let mut finalize_pending: Vec<&Rc<dyn Deferrable>> = values.iter().collect();
        let mut notify_pending: Vec<PropertyId> = Vec::with_capacity(values.len());
        let mut completed: HashSet<(PropertyId, Phase)> = HashSet::new();
        let mut report = TransactionReport::default();

        while !finalize_pending.is_empty() || !notify_pending.is_empty() {
            report.passes += 1;
            if report.passes > self.options.pass_limit {
                return Err(self.deadlock(report.passes - 1, &finalize_pending, &notify_pending, names));
            }
            let mut progressed = false;

            let mut waiting = Vec::with_capacity(finalize_pending.len());
            for value in finalize_pending {
                let id = value.property_id();
                if !self.ready(id, Phase::Finalize, scope, &completed) {
                    waiting.push(value);
                    continue;
                }
                if let Some(notifier) = value.set_deferred(false)? {
                    notifiers.push((id, notifier));
                }
                completed.insert((id, Phase::Finalize));
                report.applied.push((id, Phase::Finalize));
                notify_pending.push(id);
                progressed = true;
            }
            finalize_pending = waiting;

            let mut waiting = Vec::with_capacity(notify_pending.len());
            for id in notify_pending {
                if !self.ready(id, Phase::Notify, scope, &completed) {
                    waiting.push(id);
                    continue;
                }
                if let Some(index) = notifiers.iter().position(|(owner, _)| *owner == id) {
                    let (_, notifier) = notifiers.remove(index);
                    notifier.notify()?;
                }
                completed.insert((id, Phase::Notify));
                report.applied.push((id, Phase::Notify));
                progressed = true;
            }
            notify_pending = waiting;

            tracing::debug!(
                pass = report.passes,
                finalize_pending = finalize_pending.len(),
                notify_pending = notify_pending.len(),
                "transaction pass complete"
            );

            if !progressed {
                return Err(self.deadlock(report.passes, &finalize_pending, &notify_pending, names));
            }
        }

        Ok(report)
    }

    /// Whether every in-scope prerequisite of `(id, phase)` has completed
    fn ready(
        &self,
        id: PropertyId,
        phase: Phase,
        scope: &HashSet<PropertyId>,
        completed: &HashSet<(PropertyId, Phase)>,
    ) -> bool {
        if phase == Phase::Notify && !completed.contains(&(id, Phase::Finalize)) {
            return false;
        }
        Phase::ALL.iter().all(|before_phase| {
            self.pair(*before_phase, phase)
                .befores_of(id)
                .all(|before| !scope.contains(&before) || completed.contains(&(before, *before_phase)))
        })
    }

    fn deadlock(
        &self,
        passes: usize,
        finalize_pending: &[&Rc<dyn Deferrable>],
        notify_pending: &[PropertyId],
        names: &HashMap<PropertyId, String>,
    ) -> PropertyError {
        let label = |id: PropertyId| names.get(&id).cloned().unwrap_or_else(|| id.to_string());

        let stuck: HashSet<PropertyId> = finalize_pending
            .iter()
            .map(|value| value.property_id())
            .chain(notify_pending.iter().copied())
            .collect();
        let pending: Vec<String> = finalize_pending
            .iter()
            .map(|value| format!("{}:{}", label(value.property_id()), Phase::Finalize))
            .chain(
                notify_pending
                    .iter()
                    .map(|id| format!("{}:{}", label(*id), Phase::Notify)),
            )
            .collect();

        let mut edges = Vec::new();
        for pair in &self.pairs {
            for (before, after) in pair.edges() {
                if stuck.contains(&before) || stuck.contains(&after) {
                    edges.push(format!(
                        "{}:{} -> {}:{}",
                        label(before),
                        pair.before_phase(),
                        label(after),
                        pair.after_phase()
                    ));
                }
            }
        }

        tracing::error!(passes, pending = ?pending, edges = ?edges, "bulk transaction cannot make progress");
        PropertyError::UnsatisfiableConstraints {
            passes,
            pending,
            edges,
        }
    }
}

/// Fire the notifiers of values finalized before a transaction failed, in
/// finalization order
fn announce_stranded(notifiers: Vec<(PropertyId, Notifier)>) {
    for (_, notifier) in notifiers {
        let name = notifier.name().to_string();
        tracing::debug!(value = %name, "announcing value finalized before failure");
        if let Err(err) = notifier.notify() {
            tracing::warn!(value = %name, error = %err, "finalized value rejected after failed transaction");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
