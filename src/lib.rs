//! Host-side client for the INSEN game controller bridge.
//!
//! The bridge speaks a line-oriented text protocol over a serial link. This
//! crate frames and decodes its responses, keeps the latest input snapshot per
//! controller, and polls controllers on a fixed interval.
//!
//! ```rust,no_run
//! use insen_client::client::{ClientSettings, InsenClient};
//! use insen_client::transport::{SerialSettings, SerialTransport};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (_serial, handle) = SerialTransport::open(&SerialSettings::default())?;
//! let client = InsenClient::spawn(handle, ClientSettings::default());
//!
//! let mut events = client.subscribe();
//! client.start(0, Duration::from_millis(16)).await?;
//! while let Ok(event) = events.recv().await {
//!     if let Some(snapshot) = event.as_snapshot() {
//!         println!("{}", snapshot);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod protocol;
pub mod transport;

pub use client::{ClientSettings, InsenClient, InsenEvent};
pub use protocol::{Command, ControllerId, ControllerSnapshot, DeviceInfo, InsenError};
