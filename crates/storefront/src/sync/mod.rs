//! Cart synchronisation with the remote endpoint.
//!
//! # Modules
//!
//! - `connectivity` - process-wide online/offline state
//! - `trigger` - connectivity state machine, background-sync registry, flush scheduling
//! - `flush` - the flush run over the operation log
//! - `delivery` - the remote endpoint seam and its HTTP implementation
//! - `notify` - notifications shown on live pages

pub mod connectivity;
pub mod delivery;
pub mod flush;
pub mod notify;
pub mod trigger;

pub use connectivity::ConnectivityMonitor;
pub use delivery::{DeliveryError, HttpEndpoint, RemoteEndpoint};
pub use flush::{FlushReport, FlushWorker};
pub use notify::{Notification, NotificationError, Notifier};
pub use trigger::{
    FlushRequest, FlushScheduler, RegistrationError, SYNC_TAG, SyncEvents, SyncRegistry,
    SyncTrigger, TriggerAction,
};
