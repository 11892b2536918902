//! Change-feed mechanics: row change notifications and their pub/sub transport.
//!
//! The store publishes a [`ChangeEvent`] for every committed insert, update and
//! delete. Consumers subscribe through an [`EventBus`] and refetch whatever
//! they display when a matching change arrives.

pub mod bus;
pub mod change;
pub mod tenant;

pub use bus::{BusError, EventBus, InMemoryEventBus, Subscription};
pub use change::{ChangeEvent, ChangeFilter, ChangeKind};
pub use tenant::TenantScoped;
