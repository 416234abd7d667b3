//! Serialises and deserialises the two UDP payload kinds exchanged between
//! the client and server agents: `BIND` and `TRIGGER`.
//!
//! The codec is endian-explicit (little-endian) and never allocates beyond
//! the buffer it returns.

use crate::error::AgentError;
use crate::output::Side;
use crate::trigger::TriggerProfile;

const PAYLOAD_KIND_BIND: u8 = 0x00;
const PAYLOAD_KIND_TRIGGER: u8 = 0x01;

const PID_SIZE: usize = 4;
const BIND_SIZE: usize = 1 + PID_SIZE;
const TRIGGER_HEADER_SIZE: usize = 4;

/// A decoded UDP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bind { pid: u32 },
    Trigger {
        side: Side,
        profile: TriggerProfile,
        extras: Vec<u8>,
    },
}

/// `[0x00, pid_u32_le]` — 5 bytes.
pub fn encode_bind(pid: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(BIND_SIZE);
    buf.push(PAYLOAD_KIND_BIND);
    buf.extend_from_slice(&pid.to_le_bytes());
    buf
}

/// `[0x01, side_u8, profile_i8, extras.len() as u8, ...extras]` — `4+N` bytes.
pub fn encode_trigger(side: Side, profile: TriggerProfile, extras: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TRIGGER_HEADER_SIZE + extras.len());
    buf.push(PAYLOAD_KIND_TRIGGER);
    buf.push(match side {
        Side::Left => 0,
        Side::Right => 1,
    });
    buf.push(profile as i8 as u8);
    buf.push(extras.len() as u8);
    buf.extend_from_slice(extras);
    buf
}

/// Reads the leading discriminator, validates minimum length per kind, and
/// asserts the full payload span is present.
pub fn decode(bytes: &[u8]) -> Result<Payload, AgentError> {
    let kind = *bytes.first().ok_or(AgentError::MalformedPayload)?;
    match kind {
        PAYLOAD_KIND_BIND => {
            if bytes.len() < BIND_SIZE {
                return Err(AgentError::MalformedPayload);
            }
            let pid = u32::from_le_bytes(bytes[1..BIND_SIZE].try_into().unwrap());
            Ok(Payload::Bind { pid })
        }
        PAYLOAD_KIND_TRIGGER => {
            if bytes.len() < TRIGGER_HEADER_SIZE {
                return Err(AgentError::MalformedPayload);
            }
            let side = match bytes[1] {
                0 => Side::Left,
                1 => Side::Right,
                _ => return Err(AgentError::MalformedPayload),
            };
            let profile = TriggerProfile::try_from(bytes[2] as i8)
                .map_err(|_| AgentError::MalformedPayload)?;
            let extras_len = bytes[3] as usize;
            let extras_end = TRIGGER_HEADER_SIZE + extras_len;
            if bytes.len() < extras_end {
                return Err(AgentError::MalformedPayload);
            }
            let extras = bytes[TRIGGER_HEADER_SIZE..extras_end].to_vec();
            Ok(Payload::Trigger { side, profile, extras })
        }
        other => Err(AgentError::UnknownPayloadKind(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // S4
    #[test]
    fn bind_golden_vector() {
        let bytes = encode_bind(0x1234_5678);
        assert_eq!(bytes, vec![0x00, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(decode(&bytes).unwrap(), Payload::Bind { pid: 0x1234_5678 });
    }

    #[test]
    fn bind_round_trips_full_u32_range_samples() {
        for pid in [0u32, 1, 0xFFFF_FFFF, 0xDEAD_BEEF, 42] {
            let bytes = encode_bind(pid);
            assert_eq!(decode(&bytes).unwrap(), Payload::Bind { pid });
        }
    }

    #[test]
    fn trigger_round_trips_with_extras() {
        let extras = vec![1, 2, 3, 4, 5];
        let bytes = encode_trigger(Side::Right, TriggerProfile::Resistance, &extras);
        assert_eq!(
            decode(&bytes).unwrap(),
            Payload::Trigger {
                side: Side::Right,
                profile: TriggerProfile::Resistance,
                extras,
            }
        );
    }

    #[test]
    fn trigger_round_trips_empty_extras() {
        let bytes = encode_trigger(Side::Left, TriggerProfile::Soft, &[]);
        assert_eq!(
            decode(&bytes).unwrap(),
            Payload::Trigger {
                side: Side::Left,
                profile: TriggerProfile::Soft,
                extras: vec![],
            }
        );
    }

    #[test]
    fn truncated_bind_is_malformed() {
        assert!(matches!(
            decode(&[0x00, 0x01, 0x02]),
            Err(AgentError::MalformedPayload)
        ));
    }

    #[test]
    fn truncated_trigger_extras_is_malformed() {
        // header claims 5 extras bytes but only 2 are present
        let bytes = vec![0x01, 0x00, 0x00, 0x05, 0xAA, 0xBB];
        assert!(matches!(decode(&bytes), Err(AgentError::MalformedPayload)));
    }

    #[test]
    fn unknown_kind_is_reported() {
        assert!(matches!(
            decode(&[0x7F, 0, 0, 0]),
            Err(AgentError::UnknownPayloadKind(0x7F))
        ));
    }

    #[test]
    fn empty_buffer_is_malformed() {
        assert!(matches!(decode(&[]), Err(AgentError::MalformedPayload)));
    }
}
