// ============================================================================
// spark-properties - Bulk Load Session
// Scoped deferral of a value set, ended by one coordinated transaction
// ============================================================================

use std::rc::Rc;

use crate::coordination::coordinator::{BulkTransactionCoordinator, TransactionReport};
use crate::core::error::Result;
use crate::core::types::Deferrable;

/// Defers a set of values for the duration of a bulk load.
///
/// Write the new values through the values' own setters while the session
/// is open, then call `finish` to finalize and notify them in coordinated
/// order. A session dropped without `finish`, or whose transaction fails,
/// releases every value it still holds deferred.
///
/// # Example
///
/// ```
/// use spark_properties::{BulkLoadSession, BulkTransactionCoordinator, Property};
///
/// let coordinator = BulkTransactionCoordinator::new();
/// let width = Property::new(1);
/// let height = Property::new(1);
///
/// let session = BulkLoadSession::begin(
///     &coordinator,
///     vec![width.as_deferrable(), height.as_deferrable()],
/// )
/// .unwrap();
/// width.set(4).unwrap();
/// height.set(3).unwrap();
/// assert_eq!(width.get(), 1);
///
/// session.finish().unwrap();
/// assert_eq!((width.get(), height.get()), (4, 3));
/// ```
pub struct BulkLoadSession<'a> {
    coordinator: &'a BulkTransactionCoordinator,
    values: Vec<Rc<dyn Deferrable>>,
    finished: bool,
}

impl<'a> BulkLoadSession<'a> {
    /// Defer every value. If one cannot be deferred, the ones already
    /// deferred are released and the error is returned.
    pub fn begin(
        coordinator: &'a BulkTransactionCoordinator,
        values: Vec<Rc<dyn Deferrable>>,
    ) -> Result<Self> {
        for (index, value) in values.iter().enumerate() {
            if let Err(err) = value.set_deferred(true) {
                release(&values[..index]);
                return Err(err);
            }
        }
        tracing::debug!(values = values.len(), "bulk load session started");
        Ok(Self {
            coordinator,
            values,
            finished: false,
        })
    }

    pub fn values(&self) -> &[Rc<dyn Deferrable>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Run the coordinated transaction over every value in the session
    pub fn finish(mut self) -> Result<TransactionReport> {
        self.finished = true;
        match self.coordinator.run_transaction(&self.values) {
            Ok(report) => {
                tracing::debug!(passes = report.passes, "bulk load session finished");
                Ok(report)
            }
            Err(err) => {
                release(&self.values);
                Err(err)
            }
        }
    }
}

impl Drop for BulkLoadSession<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!(
            values = self.values.len(),
            "bulk load session dropped without finish; releasing deferred values"
        );
        release(&self.values);
    }
}

/// Undefer and notify every value still deferred, in order, uncoordinated
fn release(values: &[Rc<dyn Deferrable>]) {
    for value in values.iter().filter(|value| value.is_deferred()) {
        let notified = value
            .set_deferred(false)
            .and_then(|notifier| notifier.map_or(Ok(()), |notifier| notifier.notify()));
        if let Err(err) = notified {
            tracing::warn!(value = %value.name(), error = %err, "failed to release deferred value");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::order::Phase;
    use crate::core::error::PropertyError;
    use crate::primitives::property::Property;
    use std::cell::Cell;

    #[test]
    fn finish_applies_pending_values() {
        let coordinator = BulkTransactionCoordinator::new();
        let a = Property::new(0);
        let b = Property::new(0);
        let session =
            BulkLoadSession::begin(&coordinator, vec![a.as_deferrable(), b.as_deferrable()]).unwrap();
        assert_eq!(session.len(), 2);
        assert!(a.is_deferred() && b.is_deferred());

        a.set(1).unwrap();
        b.set(2).unwrap();
        let report = session.finish().unwrap();
        assert_eq!(report.applied.len(), 4);
        assert_eq!((a.get(), b.get()), (1, 2));
        assert!(!a.is_deferred());
    }

    #[test]
    fn begin_rolls_back_on_failure() {
        let coordinator = BulkTransactionCoordinator::new();
        let a = Property::new(0);
        let b = Property::new(0);
        b.set_deferred(true).unwrap();

        let result =
            BulkLoadSession::begin(&coordinator, vec![a.as_deferrable(), b.as_deferrable()]);
        assert!(result.err().is_some_and(|err| err.is_invalid_state()));
        assert!(!a.is_deferred());
        assert!(b.is_deferred());
    }

    #[test]
    #[tracing_test::traced_test]
    fn dropping_unfinished_session_releases_values() {
        let coordinator = BulkTransactionCoordinator::new();
        let a = Property::new(0);
        let notified = Rc::new(Cell::new(0));
        a.lazy_link({
            let notified = notified.clone();
            move |_, _, _| notified.set(notified.get() + 1)
        })
        .unwrap();

        {
            let _session = BulkLoadSession::begin(&coordinator, vec![a.as_deferrable()]).unwrap();
            a.set(8).unwrap();
        }
        assert!(!a.is_deferred());
        assert_eq!(a.get(), 8);
        assert_eq!(notified.get(), 1);
        assert!(logs_contain("dropped without finish"));
    }

    #[test]
    fn failed_transaction_releases_values() {
        let mut coordinator = BulkTransactionCoordinator::new();
        let a = Property::new(0);
        let b = Property::new(0);
        coordinator
            .register_order_dependency(a.id(), Phase::Finalize, b.id(), Phase::Finalize)
            .unwrap();
        coordinator
            .register_order_dependency(b.id(), Phase::Finalize, a.id(), Phase::Finalize)
            .unwrap();

        let session =
            BulkLoadSession::begin(&coordinator, vec![a.as_deferrable(), b.as_deferrable()]).unwrap();
        a.set(3).unwrap();
        let err = session.finish().unwrap_err();
        assert!(matches!(err, PropertyError::UnsatisfiableConstraints { .. }));
        assert!(!a.is_deferred() && !b.is_deferred());
        assert_eq!(a.get(), 3);
    }
}
