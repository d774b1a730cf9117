//! INSEN wire protocol
//!
//! Pure, synchronous building blocks of the protocol layer:
//!
//! 1. [`classifier`] - envelope check and tag dispatch
//! 2. [`decode`] - record decoders for each response type
//! 3. [`commands`] - outbound command encoding
//!
//! # Wire format
//!
//! ```text
//! host   ──► "GET 0\r\n"
//! bridge ──► ">>> INPUT|0|10,-5|0,0|0,255|03|1|87\r\n"
//!             └env┘└tag┘ fields split on '|', pairs on ','
//! ```
//!
//! Nothing here holds state or performs I/O; see [`crate::client`] for the
//! stateful side.

pub mod classifier;
pub mod commands;
pub mod decode;
pub mod error;
pub mod types;

pub use classifier::{classify, RawResponse, ENVELOPE};
pub use commands::{Command, LINE_TERMINATOR};
pub use decode::{
    decode_controller_list, decode_device_info, decode_snapshot, decode_status, parse_button_mask,
};
pub use error::{InsenError, RecordKind, Result};
pub use types::{
    Button, ButtonMask, ControllerEntry, ControllerId, ControllerList, ControllerSnapshot, DPad,
    DeviceInfo, DeviceStatus, StickAxes, TriggerPair, BUTTON_TABLE,
};
