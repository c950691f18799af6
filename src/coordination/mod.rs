// ============================================================================
// spark-properties - Coordination Module
// Ordering of finalize/notify phases across bulk transactions
// ============================================================================

pub mod coordinator;
pub mod order;
pub mod session;

pub use coordinator::{BulkTransactionCoordinator, CoordinatorOptions, TransactionReport};
pub use order::{OrderDependencyMapPair, Phase};
pub use session::BulkLoadSession;
