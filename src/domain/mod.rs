//! Domain Layer
//!
//! Entities, errors and the outbound ports the application depends on.

pub mod entities;
pub mod errors;
pub mod ports;

pub use entities::{Customer, Dvd, DvdStatus, Entity, EntityBase, Rental};
pub use errors::{ErrorKind, ServiceError};
