use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric controller slot as reported by the bridge (0-3 on current firmware)
pub type ControllerId = u8;

/// Firmware identity reported in answer to `INFO`
///
/// Replaced wholesale whenever a new INFO response is decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub firmware_version: String,
    pub build_id: String,
    pub controller_count: u32,
    pub status: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firmware {} (build {}), {} controllers, {}",
            self.firmware_version, self.build_id, self.controller_count, self.status
        )
    }
}

// Analog stick position
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickAxes {
    pub x: i16,
    pub y: i16,
}

// Analog trigger pair, 0 = released
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPair {
    pub left: u8,
    pub right: u8,
}

/// Named buttons of the INSEN bitmask
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Select,
    Start,
    Home,
    LeftStick,
    RightStick,
}

impl Button {
    /// Wire label used by the firmware documentation
    pub fn label(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::LeftBumper => "LB",
            Button::RightBumper => "RB",
            Button::Select => "SELECT",
            Button::Start => "START",
            Button::Home => "HOME",
            Button::LeftStick => "LSB",
            Button::RightStick => "RSB",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bit assignments of the button mask, in display order
pub const BUTTON_TABLE: [(u16, Button); 11] = [
    (0x001, Button::A),
    (0x002, Button::B),
    (0x004, Button::X),
    (0x008, Button::Y),
    (0x010, Button::LeftBumper),
    (0x020, Button::RightBumper),
    (0x040, Button::Select),
    (0x080, Button::Start),
    (0x100, Button::Home),
    (0x200, Button::LeftStick),
    (0x400, Button::RightStick),
];

/// Raw button bitmask as sent by the bridge
///
/// Bits outside [`BUTTON_TABLE`] are kept but have no name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ButtonMask(pub u16);

impl ButtonMask {
    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_pressed(self, button: Button) -> bool {
        BUTTON_TABLE
            .iter()
            .any(|(bit, b)| *b == button && self.0 & bit != 0)
    }

    /// Pressed buttons in table order
    pub fn pressed(self) -> Vec<Button> {
        BUTTON_TABLE
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, button)| *button)
            .collect()
    }

    pub fn names(self) -> Vec<&'static str> {
        self.pressed().into_iter().map(Button::label).collect()
    }

    pub fn any(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ButtonMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#05x}", self.0)
    }
}

/// D-pad direction, derived from the raw dpad integer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DPad {
    Neutral,
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
    Unknown(u8),
}

impl From<u8> for DPad {
    fn from(raw: u8) -> Self {
        match raw {
            0 => DPad::Neutral,
            1 => DPad::Up,
            2 => DPad::UpRight,
            3 => DPad::Right,
            4 => DPad::DownRight,
            5 => DPad::Down,
            6 => DPad::DownLeft,
            7 => DPad::Left,
            8 => DPad::UpLeft,
            other => DPad::Unknown(other),
        }
    }
}

/// One point-in-time state of a single controller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub id: ControllerId,
    pub left_stick: StickAxes,
    pub right_stick: StickAxes,
    pub triggers: TriggerPair,
    pub buttons: ButtonMask,
    pub dpad: u8,
    pub battery_percent: u8,
    /// Wall-clock time of decoding, not a firmware timestamp
    pub captured_at: DateTime<Local>,
}

impl ControllerSnapshot {
    pub fn dpad_direction(&self) -> DPad {
        DPad::from(self.dpad)
    }

    pub fn button_names(&self) -> Vec<&'static str> {
        self.buttons.names()
    }

    /// True if any stick axis leaves the `threshold` band or any button is down
    pub fn has_significant_input(&self, threshold: i16) -> bool {
        let threshold = threshold.unsigned_abs();
        [
            self.left_stick.x,
            self.left_stick.y,
            self.right_stick.x,
            self.right_stick.y,
        ]
        .iter()
        .any(|axis| axis.unsigned_abs() > threshold)
            || self.buttons.any()
    }
}

impl fmt::Display for ControllerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Controller {}: L:({:6},{:6}) R:({:6},{:6}) T:({},{}) Buttons: {:?} DPad: {:?} Battery: {}%",
            self.id,
            self.left_stick.x,
            self.left_stick.y,
            self.right_stick.x,
            self.right_stick.y,
            self.triggers.left,
            self.triggers.right,
            self.button_names(),
            self.dpad_direction(),
            self.battery_percent
        )
    }
}

/// Controller enumeration as reported by `LIST`
///
/// Entries are kept verbatim; [`ControllerList::entries`] splits the
/// `<id>_<TYPE>` form most firmware builds use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerList {
    pub ids: Vec<String>,
}

/// A `<id>_<TYPE>` controller list entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerEntry {
    pub id: ControllerId,
    pub kind: String,
}

impl ControllerList {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn entries(&self) -> Vec<ControllerEntry> {
        self.ids
            .iter()
            .filter_map(|raw| {
                let (id, kind) = raw.split_once('_')?;
                Some(ControllerEntry {
                    id: id.parse().ok()?,
                    kind: kind.to_string(),
                })
            })
            .collect()
    }
}

/// Counters reported in answer to `STATUS`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub active_controllers: Option<u32>,
    pub total_inputs: Option<u64>,
    pub api_commands: Option<u64>,
    pub free_heap: Option<u64>,
    pub raw: String,
}
