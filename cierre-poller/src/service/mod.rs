//! Service layer
//!
//! Services contain the reconciliation logic of the tracker: starting jobs,
//! mirroring entity statuses, turning snapshots into state changes, and
//! telling the user what happened.

pub mod initiator;
pub mod notifier;
pub mod reconciler;
pub mod store;

pub use initiator::{Initiation, JobInitiator};
pub use notifier::{Notification, NotificationLevel, Notifier, TracingNotifier};
pub use reconciler::{CompletionCallback, Reconciled, StateReconciler, TerminalState};
pub use store::{EntityKey, EntityStatusStore, OptimisticWrite, Sequence};
