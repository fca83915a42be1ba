//! Application Layer
//!
//! Use cases orchestrating the domain through ports, plus the resilient
//! wrappers and the remote DVD proxy.

mod customer_service;
mod dvd_proxy;
mod dvd_service;
mod resilient;
mod validation;

pub use customer_service::{BasicCustomerService, CustomerService};
pub use dvd_proxy::{default_proxy_policy, DvdProxy, DvdRentalProxy};
pub use dvd_service::{BasicDvdService, DvdService};
pub use resilient::{default_endpoint_policy, ResilientCustomerService, ResilientDvdService};
