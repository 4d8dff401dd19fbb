pub mod catalog;
pub mod config;
pub mod db;
pub mod directory;
pub mod enrollment;
pub mod error;
pub mod events;
pub mod utils;

#[cfg(test)]
pub(crate) mod fixtures;

pub use enrollment::{EnrollmentService, groups::GroupEnrollmentService};
pub use error::{Error, ErrorKind, Result};
pub use events::{ChannelPublisher, DomainEvent, EventPublisher, NoopPublisher};
