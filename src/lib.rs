//! DVD rental services library
//!
//! This module exposes the customer and DVD service components for use in
//! integration tests and by the binary's composition root.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{
    BasicCustomerService, BasicDvdService, CustomerService, DvdProxy, DvdService,
    ResilientCustomerService, ResilientDvdService,
};
pub use config::{load_config, Config, ServiceKind};
pub use domain::entities::{Customer, Dvd, DvdStatus, Entity, EntityBase, Rental};
pub use domain::errors::{ErrorKind, ServiceError};
pub use domain::ports::{DvdTransport, EntityCache, EntityStore, HashCache, MetricsStore, Repository};
pub use infrastructure::{CallContext, Resilience, ShutdownController};
