//! Pure record decoders.
//!
//! Each decoder receives the envelope-stripped remainder returned by
//! [`classify`](super::classify) and splits it on `|`. Decoders never touch
//! shared state: a failed decode returns [`InsenError::MalformedRecord`] and the
//! caller decides what to do with it.

use super::classifier::{CONTROLLER_LIST_TAG, STATUS_TAG};
use super::error::{InsenError, RecordKind, Result};
use super::types::{
    ButtonMask, ControllerList, ControllerSnapshot, DeviceInfo, DeviceStatus, StickAxes,
    TriggerPair,
};
use chrono::{DateTime, Local};
use std::str::FromStr;

pub const FIELD_DELIMITER: char = '|';
pub const PAIR_DELIMITER: char = ',';

pub const VERSION_PREFIX: &str = "INSEN_FW_V";
pub const BUILD_PREFIX: &str = "BUILD_";
pub const CONTROLLER_COUNT_PREFIX: &str = "CONTROLLERS_";

const DEVICE_INFO_MIN_FIELDS: usize = 5;
const SNAPSHOT_MIN_FIELDS: usize = 8;
const MAX_BATTERY_PERCENT: u8 = 100;

/// Decode `INSEN_FW_V<ver>|BUILD_<id>|CONTROLLERS_<n>|<unused>|<status>`
///
/// Field 3 carries no documented meaning and is skipped.
pub fn decode_device_info(remainder: &str) -> Result<DeviceInfo> {
    let kind = RecordKind::DeviceInfo;
    let fields: Vec<&str> = remainder.split(FIELD_DELIMITER).collect();
    if fields.len() < DEVICE_INFO_MIN_FIELDS {
        return Err(InsenError::malformed(
            kind,
            format!(
                "expected at least {} fields, got {}",
                DEVICE_INFO_MIN_FIELDS,
                fields.len()
            ),
        ));
    }

    let firmware_version = strip_literal(fields[0], VERSION_PREFIX).to_string();
    let build_id = strip_literal(fields[1], BUILD_PREFIX).to_string();
    let controller_count = parse_number(
        kind,
        "controller count",
        strip_literal(fields[2], CONTROLLER_COUNT_PREFIX),
    )?;

    Ok(DeviceInfo {
        firmware_version,
        build_id,
        controller_count,
        status: fields[4].to_string(),
    })
}

/// Decode `INPUT|id|lx,ly|rx,ry|lt,rt|buttons_hex|dpad|battery[|...]`
///
/// `captured_at` is stamped onto the snapshot as-is; fields past the battery
/// (the firmware tick counter on newer builds) are ignored.
pub fn decode_snapshot(remainder: &str, captured_at: DateTime<Local>) -> Result<ControllerSnapshot> {
    let kind = RecordKind::ControllerSnapshot;
    let fields: Vec<&str> = remainder.split(FIELD_DELIMITER).collect();
    if fields.len() < SNAPSHOT_MIN_FIELDS {
        return Err(InsenError::malformed(
            kind,
            format!(
                "expected at least {} fields, got {}",
                SNAPSHOT_MIN_FIELDS,
                fields.len()
            ),
        ));
    }

    let id = parse_number(kind, "controller id", fields[1])?;
    let (lx, ly) = parse_pair(kind, "left stick", fields[2])?;
    let (rx, ry) = parse_pair(kind, "right stick", fields[3])?;
    let (lt, rt) = parse_pair(kind, "triggers", fields[4])?;
    let buttons = parse_button_mask(fields[5])?;
    let dpad = parse_number(kind, "dpad", fields[6])?;
    let battery_percent: u8 = parse_number(kind, "battery", fields[7])?;
    if battery_percent > MAX_BATTERY_PERCENT {
        return Err(InsenError::malformed(
            kind,
            format!("battery {}% out of range", battery_percent),
        ));
    }

    Ok(ControllerSnapshot {
        id,
        left_stick: StickAxes { x: lx, y: ly },
        right_stick: StickAxes { x: rx, y: ry },
        triggers: TriggerPair {
            left: lt,
            right: rt,
        },
        buttons,
        dpad,
        battery_percent,
        captured_at,
    })
}

/// Decode `CONTROLLERS|<id>|<id>...` into the reported ids, in order
pub fn decode_controller_list(remainder: &str) -> ControllerList {
    let body = remainder
        .strip_prefix(CONTROLLER_LIST_TAG)
        .unwrap_or(remainder);
    let body = body.strip_prefix(FIELD_DELIMITER).unwrap_or(body);

    if body.is_empty() {
        return ControllerList::default();
    }

    ControllerList {
        ids: body.split(FIELD_DELIMITER).map(str::to_string).collect(),
    }
}

/// Decode `STATUS|ACTIVE_<n>|TOTAL_INPUTS_<n>|API_COMMANDS_<n>|FREE_HEAP_<n>`
///
/// Fields may come in any order; unknown fields are skipped.
pub fn decode_status(remainder: &str) -> Result<DeviceStatus> {
    let kind = RecordKind::DeviceStatus;
    let body = remainder.strip_prefix(STATUS_TAG).unwrap_or(remainder);
    let mut status = DeviceStatus {
        raw: remainder.to_string(),
        ..Default::default()
    };

    for field in body.split(FIELD_DELIMITER).filter(|f| !f.is_empty()) {
        if let Some(value) = field.strip_prefix("ACTIVE_") {
            status.active_controllers = Some(parse_number(kind, "active controllers", value)?);
        } else if let Some(value) = field.strip_prefix("TOTAL_INPUTS_") {
            status.total_inputs = Some(parse_number(kind, "total inputs", value)?);
        } else if let Some(value) = field.strip_prefix("API_COMMANDS_") {
            status.api_commands = Some(parse_number(kind, "api commands", value)?);
        } else if let Some(value) = field.strip_prefix("FREE_HEAP_") {
            status.free_heap = Some(parse_number(kind, "free heap", value)?);
        }
    }

    Ok(status)
}

/// Parse a hexadecimal button mask, with or without a `0x` prefix
pub fn parse_button_mask(field: &str) -> Result<ButtonMask> {
    let digits = field.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);

    u16::from_str_radix(digits, 16).map(ButtonMask).map_err(|e| {
        InsenError::malformed(
            RecordKind::ControllerSnapshot,
            format!("button mask {:?}: {}", field, e),
        )
    })
}

fn strip_literal<'a>(field: &'a str, prefix: &str) -> &'a str {
    field.strip_prefix(prefix).unwrap_or(field)
}

fn parse_number<T>(kind: RecordKind, what: &str, field: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    field
        .trim()
        .parse::<T>()
        .map_err(|e| InsenError::malformed(kind, format!("{} {:?}: {}", what, field, e)))
}

fn parse_pair<T>(kind: RecordKind, what: &str, field: &str) -> Result<(T, T)>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let mut parts = field.split(PAIR_DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) => Ok((
            parse_number(kind, what, first)?,
            parse_number(kind, what, second)?,
        )),
        _ => Err(InsenError::malformed(
            kind,
            format!("{} {:?}: expected two comma separated values", what, field),
        )),
    }
}
