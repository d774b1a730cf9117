//! Envelope stripping and tag dispatch for inbound lines.
//!
//! Every response from the bridge starts with `>>> `. Anything else on the link
//! (boot banners, debug prints) is ignored without error.

/// Prefix marking a line as a protocol response
pub const ENVELOPE: &str = ">>> ";

pub const DEVICE_INFO_TAG: &str = "INSEN_FW_V";
pub const SNAPSHOT_TAG: &str = "INPUT|";
pub const CONTROLLER_LIST_TAG: &str = "CONTROLLERS";
pub const STATUS_TAG: &str = "STATUS";

/// A classified response, still undecoded
///
/// Each variant carries the remainder after the envelope, tag included, which
/// is what the matching decoder expects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawResponse<'a> {
    DeviceInfo(&'a str),
    ControllerSnapshot(&'a str),
    ControllerList(&'a str),
    DeviceStatus(&'a str),
    /// Enveloped but with a tag this client does not know
    Unrecognized(&'a str),
}

/// Classify one line
///
/// Returns `None` when the line lacks the envelope. Tags are checked in fixed
/// precedence: device info, snapshot, controller list, status.
pub fn classify(line: &str) -> Option<RawResponse<'_>> {
    let remainder = line.strip_prefix(ENVELOPE)?;

    let response = if remainder.starts_with(DEVICE_INFO_TAG) {
        RawResponse::DeviceInfo(remainder)
    } else if remainder.starts_with(SNAPSHOT_TAG) {
        RawResponse::ControllerSnapshot(remainder)
    } else if remainder.starts_with(CONTROLLER_LIST_TAG) {
        RawResponse::ControllerList(remainder)
    } else if remainder.starts_with(STATUS_TAG) {
        RawResponse::DeviceStatus(remainder)
    } else {
        RawResponse::Unrecognized(remainder)
    };

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_without_envelope_are_ignored() {
        assert_eq!(classify("INPUT|0|0,0|0,0|0,0|00|0|100"), None);
        assert_eq!(classify(">>>INPUT|0"), None);
        assert_eq!(classify("  >>> INPUT|0"), None);
        assert_eq!(classify(""), None);
        assert_eq!(classify("USB host ready"), None);
    }

    #[test]
    fn test_classify_known_tags() {
        assert_eq!(
            classify(">>> INSEN_FW_V2.1|BUILD_104|CONTROLLERS_2|X|RUNNING"),
            Some(RawResponse::DeviceInfo(
                "INSEN_FW_V2.1|BUILD_104|CONTROLLERS_2|X|RUNNING"
            ))
        );
        assert_eq!(
            classify(">>> INPUT|0|1,2|3,4|5,6|03|1|87"),
            Some(RawResponse::ControllerSnapshot("INPUT|0|1,2|3,4|5,6|03|1|87"))
        );
        assert_eq!(
            classify(">>> CONTROLLERS|0_XBOX_ONE"),
            Some(RawResponse::ControllerList("CONTROLLERS|0_XBOX_ONE"))
        );
        assert_eq!(
            classify(">>> STATUS|ACTIVE_1"),
            Some(RawResponse::DeviceStatus("STATUS|ACTIVE_1"))
        );
    }

    #[test]
    fn test_input_tag_requires_delimiter() {
        assert_eq!(
            classify(">>> INPUTS"),
            Some(RawResponse::Unrecognized("INPUTS"))
        );
    }

    #[test]
    fn test_unknown_tag_is_unrecognized() {
        assert_eq!(
            classify(">>> RUMBLE|0|255"),
            Some(RawResponse::Unrecognized("RUMBLE|0|255"))
        );
        assert_eq!(classify(">>> "), Some(RawResponse::Unrecognized("")));
    }
}
