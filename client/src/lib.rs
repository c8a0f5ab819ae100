//! Client half of the procurement tracker: an in-memory store holding
//! the four record collections for one session, synchronized with the
//! server through the read-all / replace-all gateway. Every mutation
//! funnels through the store; the UI layer renders from its accessors
//! and never touches the collections directly.

pub mod error;
pub mod gateway;
pub mod ops;
pub mod policy;
pub mod queries;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::StoreError;
pub use gateway::{HttpPersistenceGateway, PersistenceGateway};
pub use ops::{PaymentDraft, ProcessDraft};
pub use policy::Capability;
pub use store::{ClientStore, SyncState};
