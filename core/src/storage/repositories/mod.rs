pub mod pending;
pub mod record_repository;

use shared::{Asset, Category, Liability, Transaction};

pub use pending::{ConfirmedIds, PendingChanges};
pub use record_repository::{reconcile, PullOutcome, PushOutcome, Reconciled, RecordRepository};

pub type TransactionRepository = RecordRepository<Transaction>;
pub type AssetRepository = RecordRepository<Asset>;
pub type LiabilityRepository = RecordRepository<Liability>;
pub type CategoryRepository = RecordRepository<Category>;
