//! Core ledger logic, independent of any transport layer.
//!
//! Every operation is a method on [`Ledger`]. The owner id is passed
//! explicitly to each call and every query is filtered by it.

pub mod account;
pub mod clock;
pub mod ledger;
pub mod locks;
pub mod reconcile;
pub mod report;
pub mod transaction;
pub mod transfer;

pub use account::AccountDeletion;
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::Ledger;
pub use reconcile::{ReconcileOutcome, ReconcileReport};
pub use report::{CategoryTotal, DivisionTotal, ReportFilter, Summary};
pub use transaction::{NewTransaction, TransactionChanges, TransactionFilter, TransactionView};
pub use transfer::{NewTransfer, TransferReceipt, TransferView};
