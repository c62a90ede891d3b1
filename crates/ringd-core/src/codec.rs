//! Command frame encoding and reply decoding for the ring's GATT protocol.
//!
//! The vendor protocol is a simple opcode scheme: a request frame carries a
//! single opcode byte, and the matching reply echoes the opcode with the
//! reply flag set, followed by a big-endian u32 value.
//!
//! ```text
//! request:  ┌────────┐
//!           │ opcode │
//!           └────────┘
//! reply:    ┌──────────────┬────────────────────┐
//!           │ opcode|0x80  │ value (4 bytes BE) │
//!           └──────────────┴────────────────────┘
//! ```
//!
//! Replies are matched to requests by this reply signature, not by send
//! order — the ring may interleave replies for independently outstanding
//! metric kinds.

use crate::types::MetricKind;

/// Flag bit distinguishing a reply opcode from its request opcode.
const REPLY_FLAG: u8 = 0x80;

/// Length of a well-formed reply frame: opcode byte plus u32 value.
const REPLY_LEN: usize = 5;

const OP_HEART_RATE: u8 = 0x11;
const OP_STEPS: u8 = 0x12;
const OP_BLOOD_OXYGEN: u8 = 0x13;

/// Request opcode for a metric kind.
#[must_use]
pub const fn request_opcode(kind: MetricKind) -> u8 {
    match kind {
        MetricKind::HeartRate => OP_HEART_RATE,
        MetricKind::Steps => OP_STEPS,
        MetricKind::BloodOxygen => OP_BLOOD_OXYGEN,
    }
}

/// Reply opcode (the reply signature) for a metric kind.
#[must_use]
pub const fn reply_opcode(kind: MetricKind) -> u8 {
    request_opcode(kind) | REPLY_FLAG
}

/// Encodes the request frame asking the ring for one metric.
#[must_use]
pub fn encode_request(kind: MetricKind) -> Vec<u8> {
    vec![request_opcode(kind)]
}

/// Decodes an inbound frame as a metric reply.
///
/// Returns `None` for frames that are not well-formed metric replies —
/// the ring also notifies unsolicited status frames, which the multiplexer
/// ignores.
#[must_use]
pub fn decode_reply(frame: &[u8]) -> Option<(MetricKind, u32)> {
    if frame.len() != REPLY_LEN {
        return None;
    }

    let kind = match frame[0] {
        op if op == reply_opcode(MetricKind::HeartRate) => MetricKind::HeartRate,
        op if op == reply_opcode(MetricKind::Steps) => MetricKind::Steps,
        op if op == reply_opcode(MetricKind::BloodOxygen) => MetricKind::BloodOxygen,
        _ => return None,
    };

    let value = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
    Some((kind, value))
}

/// Encodes the reply frame a ring would send for `kind`. Test fixtures and
/// the mock link use this to script device behavior.
#[must_use]
pub fn encode_reply(kind: MetricKind, value: u32) -> Vec<u8> {
    let mut frame = Vec::with_capacity(REPLY_LEN);
    frame.push(reply_opcode(kind));
    frame.extend_from_slice(&value.to_be_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_frames_are_one_opcode_byte() {
        assert_eq!(encode_request(MetricKind::HeartRate), vec![0x11]);
        assert_eq!(encode_request(MetricKind::Steps), vec![0x12]);
        assert_eq!(encode_request(MetricKind::BloodOxygen), vec![0x13]);
    }

    #[test]
    fn test_reply_decodes_to_kind_and_value() {
        let frame = encode_reply(MetricKind::HeartRate, 72);
        assert_eq!(decode_reply(&frame), Some((MetricKind::HeartRate, 72)));

        let frame = encode_reply(MetricKind::Steps, 10_432);
        assert_eq!(decode_reply(&frame), Some((MetricKind::Steps, 10_432)));
    }

    #[test]
    fn test_reply_signature_differs_from_request() {
        for kind in MetricKind::ALL {
            assert_ne!(request_opcode(kind), reply_opcode(kind));
        }
    }

    #[test]
    fn test_malformed_frames_are_ignored() {
        // Wrong length
        assert_eq!(decode_reply(&[0x91, 0, 0]), None);
        // Unknown opcode
        assert_eq!(decode_reply(&[0x7F, 0, 0, 0, 42]), None);
        // Request opcode without the reply flag
        assert_eq!(decode_reply(&[0x11, 0, 0, 0, 42]), None);
        // Empty
        assert_eq!(decode_reply(&[]), None);
    }
}
