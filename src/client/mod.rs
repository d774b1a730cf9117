//! Stateful protocol core
//!
//! - [`line_processor`] consumes transport events and owns all writes
//! - [`store`] keeps the latest snapshot per controller
//! - [`poll_driver`] issues periodic `GET` requests
//! - [`client_handle`] is the consumer-facing [`InsenClient`]

pub mod client_handle;
pub mod events;
pub mod line_processor;
pub mod poll_driver;
pub mod store;

pub use client_handle::{ClientSettings, InsenClient};
pub use events::InsenEvent;
pub use line_processor::{LineProcessor, ProcessorStats};
pub use poll_driver::{PollDriver, PollSlot, PollTarget};
pub use store::{ControllerStore, StoreReader};
