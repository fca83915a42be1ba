mod dvd_transport;
mod entity_cache;
mod entity_store;
mod hash_cache;
mod metrics_store;
mod repository;

pub use dvd_transport::{DvdTransport, RemoteMethod, RemoteOutcome, WireRequest, WireResponse};
pub use entity_cache::EntityCache;
pub use entity_store::{EntityStore, StoreTx};
pub use hash_cache::HashCache;
pub use metrics_store::MetricsStore;
pub use repository::{Mutation, Repository};
