//! Pure mapping from a named haptic profile to the 11-byte adaptive-trigger
//! block the DualSense HID output report expects.
//!
//! Every profile's encoding is bit-exact with the PlayStation driver; see
//! DESIGN.md for the provenance of each table entry. The encoder never
//! panics: a profile whose preconditions on `extras` are not met degrades to
//! the mode byte followed by ten zero bytes.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Size, in bytes, of one trigger's parameter block within the HID report.
pub const TRIGGER_BLOCK_SIZE: usize = 11;

/// Discriminator byte understood by the controller firmware.
///
/// Several named values alias the same byte (`Feedback` == `Rigid_A`,
/// `Weapon` == `Rigid_AB`, `Vibration` == `Pulse_B2`), so this is a newtype
/// over `u8` rather than a closed enum with unique discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerMode(pub u8);

impl TriggerMode {
    pub const OFF: TriggerMode = TriggerMode(0x00);
    pub const RIGID: TriggerMode = TriggerMode(0x01);
    pub const PULSE: TriggerMode = TriggerMode(0x02);
    pub const RIGID_A: TriggerMode = TriggerMode(0x21);
    pub const RIGID_B: TriggerMode = TriggerMode(0x05);
    pub const RIGID_AB: TriggerMode = TriggerMode(0x25);
    pub const PULSE_A: TriggerMode = TriggerMode(0x22);
    pub const PULSE_B: TriggerMode = TriggerMode(0x06);
    pub const PULSE_A2: TriggerMode = TriggerMode(0x23);
    pub const PULSE_B2: TriggerMode = TriggerMode(0x26);
    pub const PULSE_AB: TriggerMode = TriggerMode(0x27);
    pub const CALIBRATION: TriggerMode = TriggerMode(0xFC);
    // Aliases, kept distinct by name even though the byte value repeats.
    pub const FEEDBACK: TriggerMode = TriggerMode(0x21);
    pub const WEAPON: TriggerMode = TriggerMode(0x25);
    pub const VIBRATION: TriggerMode = TriggerMode(0x26);
}

impl From<u8> for TriggerMode {
    fn from(byte: u8) -> Self {
        TriggerMode(byte)
    }
}

/// High-level haptic intent exposed to callers. The discriminant matches the
/// `profile: i8` field of the wire protocol's TRIGGER payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum TriggerProfile {
    Normal = 0,
    GameCube,
    VerySoft,
    Soft,
    Medium,
    Hard,
    VeryHard,
    Hardest,
    Rigid,
    Choppy,
    VibrateTrigger,
    VibrateTriggerPulse,
    Resistance,
    Galloping,
    Machine,
    Feedback,
    Vibration,
    VibrateTrigger10Hz,
    SlopeFeedback,
    MultiplePositionFeedback,
    MultiplePositionVibration,
    Bow,
    Weapon,
    SemiAutomaticGun,
    AutomaticGun,
    Custom,
}

impl Default for TriggerProfile {
    fn default() -> Self {
        TriggerProfile::Normal
    }
}

impl TryFrom<i8> for TriggerProfile {
    type Error = ();

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        use TriggerProfile::*;
        const ALL: [TriggerProfile; 26] = [
            Normal,
            GameCube,
            VerySoft,
            Soft,
            Medium,
            Hard,
            VeryHard,
            Hardest,
            Rigid,
            Choppy,
            VibrateTrigger,
            VibrateTriggerPulse,
            Resistance,
            Galloping,
            Machine,
            Feedback,
            Vibration,
            VibrateTrigger10Hz,
            SlopeFeedback,
            MultiplePositionFeedback,
            MultiplePositionVibration,
            Bow,
            Weapon,
            SemiAutomaticGun,
            AutomaticGun,
            Custom,
        ];
        ALL.into_iter().find(|p| *p as i8 == value).ok_or(())
    }
}

fn zero_with_mode(mode: TriggerMode) -> [u8; TRIGGER_BLOCK_SIZE] {
    let mut buf = [0u8; TRIGGER_BLOCK_SIZE];
    buf[0] = mode.0;
    buf
}

/// Bounds-checked `extras` read. Replaces the reference implementation's
/// unchecked vector indexing: a missing index is treated the same as a
/// failed numeric precondition, never read past the end.
fn get(extras: &[u8], i: usize) -> Option<u8> {
    extras.get(i).copied()
}

/// Packs up to 10 per-position strengths (1..=8, 0 = unset) into the
/// mask/intensity pair the grid-packed profiles share.
fn pack_grid(strengths: &[u8; 10]) -> (u16, u32) {
    let mut num2: u16 = 0;
    let mut num: u32 = 0;
    for (i, &s) in strengths.iter().enumerate() {
        if s == 0 {
            continue;
        }
        num2 |= 1 << i;
        let b = ((s - 1) & 7) as u32;
        num |= b << (3 * i);
    }
    (num2, num)
}

fn write_grid(buf: &mut [u8; TRIGGER_BLOCK_SIZE], num2: u16, num: u32) {
    buf[1] = (num2 & 0xFF) as u8;
    buf[2] = (num2 >> 8) as u8;
    let num_bytes = num.to_le_bytes();
    buf[3..7].copy_from_slice(&num_bytes);
}

/// Translates `(profile, extras)` into the bit-exact 11-byte trigger block.
///
/// Never panics. A profile whose preconditions on `extras` fail (missing
/// parameters or out-of-range values) produces `[mode, 0, 0, ..., 0]`.
pub fn encode(profile: TriggerProfile, extras: &[u8]) -> [u8; TRIGGER_BLOCK_SIZE] {
    use TriggerProfile::*;

    match profile {
        Normal => zero_with_mode(TriggerMode::RIGID_B),

        GameCube => {
            let mut buf = zero_with_mode(TriggerMode::PULSE);
            buf[1] = 144;
            buf[2] = 160;
            buf[3] = 255;
            buf
        }
        VerySoft => {
            let mut buf = zero_with_mode(TriggerMode::PULSE);
            buf[1] = 128;
            buf[2] = 160;
            buf[3] = 255;
            buf
        }
        Soft => {
            let mut buf = zero_with_mode(TriggerMode::RIGID_A);
            buf[1] = 69;
            buf[2] = 160;
            buf[3] = 255;
            buf
        }
        Medium => {
            let mut buf = zero_with_mode(TriggerMode::PULSE_A);
            buf[1..8].copy_from_slice(&[2, 35, 1, 6, 6, 1, 33]);
            buf
        }
        Hard => {
            let mut buf = zero_with_mode(TriggerMode::RIGID_A);
            buf[1..8].copy_from_slice(&[32, 160, 255, 255, 255, 255, 255]);
            buf
        }
        VeryHard => {
            let mut buf = zero_with_mode(TriggerMode::RIGID_A);
            buf[1..8].copy_from_slice(&[16, 160, 255, 255, 255, 255, 255]);
            buf
        }
        Hardest => {
            let mut buf = zero_with_mode(TriggerMode::PULSE);
            buf[1..8].copy_from_slice(&[0, 255, 255, 255, 255, 255, 255]);
            buf
        }
        Rigid => {
            let mut buf = zero_with_mode(TriggerMode::RIGID);
            buf[1..4].copy_from_slice(&[0, 255, 0]);
            buf
        }
        Choppy => {
            let mut buf = zero_with_mode(TriggerMode::RIGID_A);
            buf[1..7].copy_from_slice(&[2, 39, 33, 39, 38, 2]);
            buf
        }
        VibrateTrigger | VibrateTriggerPulse => {
            let mut buf = zero_with_mode(TriggerMode::PULSE_AB);
            buf[1..8].copy_from_slice(&[37, 35, 6, 39, 33, 35, 34]);
            buf
        }
        VibrateTrigger10Hz => {
            let mut buf = zero_with_mode(TriggerMode::PULSE_B);
            buf[1..4].copy_from_slice(&[10, 255, 40]);
            buf
        }

        Bow => {
            let mode = TriggerMode::PULSE_A;
            let (Some(start), Some(end), Some(force), Some(snap_force)) = (
                get(extras, 0),
                get(extras, 1),
                get(extras, 2),
                get(extras, 3),
            ) else {
                return zero_with_mode(mode);
            };
            if !(start <= 8
                && end <= 8
                && start < end
                && force <= 8
                && snap_force <= 8
                && end > 0
                && force > 0
                && snap_force > 0)
            {
                return zero_with_mode(mode);
            }
            let mut buf = zero_with_mode(mode);
            let mask: u16 = (1u16 << start) | (1u16 << end);
            let params: u32 = (((force - 1) & 7) as u32) | ((((snap_force - 1) & 7) as u32) << 3);
            buf[1] = (mask & 0xFF) as u8;
            buf[2] = (mask >> 8) as u8;
            buf[3] = (params & 0xFF) as u8;
            buf[4] = ((params >> 8) & 0xFF) as u8;
            buf
        }

        Resistance => {
            let mode = TriggerMode::RIGID_B;
            let (Some(start), Some(force)) = (get(extras, 0), get(extras, 1)) else {
                return zero_with_mode(mode);
            };
            if !(start <= 9 && force <= 8 && force > 0) {
                return zero_with_mode(mode);
            }
            let mut strengths = [0u8; 10];
            for s in &mut strengths[start as usize..10] {
                *s = force;
            }
            let (num2, num) = pack_grid(&strengths);
            let mut buf = zero_with_mode(mode);
            write_grid(&mut buf, num2, num);
            buf
        }

        Galloping => {
            let mode = TriggerMode::PULSE_A2;
            let (Some(start), Some(end), Some(first_foot), Some(second_foot), Some(frequency)) = (
                get(extras, 0),
                get(extras, 1),
                get(extras, 2),
                get(extras, 3),
                get(extras, 4),
            ) else {
                return zero_with_mode(mode);
            };
            if !(start <= 8
                && end <= 9
                && start < end
                && second_foot <= 7
                && first_foot <= 6
                && first_foot < second_foot
                && frequency > 0)
            {
                return zero_with_mode(mode);
            }
            let mut buf = zero_with_mode(mode);
            let mask: u16 = (1u16 << start) | (1u16 << end);
            let params: u8 = (second_foot & 7) | ((first_foot & 7) << 3);
            buf[1] = (mask & 0xFF) as u8;
            buf[2] = (mask >> 8) as u8;
            buf[3] = params;
            buf[4] = frequency;
            buf
        }

        Machine => {
            let mode = TriggerMode::PULSE_AB;
            let (
                Some(start),
                Some(end),
                Some(strength_a),
                Some(strength_b),
                Some(frequency),
                Some(period),
            ) = (
                get(extras, 0),
                get(extras, 1),
                get(extras, 2),
                get(extras, 3),
                get(extras, 4),
                get(extras, 5),
            )
            else {
                return zero_with_mode(mode);
            };
            if !(start <= 8 && end <= 9 && end > start && strength_a <= 7 && strength_b <= 7 && frequency > 0)
            {
                return zero_with_mode(mode);
            }
            let mut buf = zero_with_mode(mode);
            let mask: u16 = (1u16 << start) | (1u16 << end);
            let params: u8 = (strength_a & 7) | ((strength_b & 7) << 3);
            buf[1] = (mask & 0xFF) as u8;
            buf[2] = (mask >> 8) as u8;
            buf[3] = params;
            buf[4] = frequency;
            buf[5] = period;
            buf
        }

        Feedback => {
            let mode = TriggerMode::RIGID_A;
            let (Some(position), Some(strength)) = (get(extras, 0), get(extras, 1)) else {
                return zero_with_mode(mode);
            };
            if !(position <= 9 && strength <= 8) {
                return zero_with_mode(mode);
            }
            if strength == 0 {
                return zero_with_mode(mode);
            }
            let mut strengths = [0u8; 10];
            for s in &mut strengths[position as usize..10] {
                *s = strength;
            }
            let (num2, num) = pack_grid(&strengths);
            let mut buf = zero_with_mode(mode);
            write_grid(&mut buf, num2, num);
            buf
        }

        Vibration => {
            let mode = TriggerMode::VIBRATION;
            let (Some(position), Some(amplitude), Some(frequency)) =
                (get(extras, 0), get(extras, 1), get(extras, 2))
            else {
                return zero_with_mode(mode);
            };
            if !(position <= 9 && amplitude <= 10 && amplitude > 0 && frequency > 0) {
                return zero_with_mode(mode);
            }
            let mut strengths = [0u8; 10];
            for s in &mut strengths[position as usize..10] {
                *s = amplitude;
            }
            let (num2, num) = pack_grid(&strengths);
            let mut buf = zero_with_mode(mode);
            write_grid(&mut buf, num2, num);
            buf[9] = frequency;
            buf
        }

        SlopeFeedback => {
            let mode = TriggerMode::RIGID_A;
            let (Some(start_pos), Some(end_pos), Some(start_str), Some(end_str)) = (
                get(extras, 0),
                get(extras, 1),
                get(extras, 2),
                get(extras, 3),
            ) else {
                return zero_with_mode(mode);
            };
            if !(start_pos <= 8
                && end_pos <= 9
                && end_pos > start_pos
                && (1..=8).contains(&start_str)
                && (1..=8).contains(&end_str))
            {
                return zero_with_mode(mode);
            }
            let slope = (end_str as f32 - start_str as f32) / (end_pos as f32 - start_pos as f32);
            let mut array = [0u8; 10];
            for (i, slot) in array.iter_mut().enumerate().skip(start_pos as usize) {
                *slot = if i as u8 <= end_pos {
                    let strength = start_str as f32 + slope * (i as f32 - start_pos as f32);
                    strength.round() as u8
                } else {
                    end_str
                };
            }
            if array.iter().all(|&s| s == 0) {
                return zero_with_mode(mode);
            }
            let (num2, num) = pack_grid(&array);
            let mut buf = zero_with_mode(mode);
            write_grid(&mut buf, num2, num);
            buf
        }

        MultiplePositionFeedback => {
            let mode = TriggerMode::RIGID_A;
            let mut strengths = [0u8; 10];
            for (i, slot) in strengths.iter_mut().enumerate() {
                *slot = get(extras, i).unwrap_or(0);
            }
            let (num2, num) = pack_grid(&strengths);
            let mut buf = zero_with_mode(mode);
            write_grid(&mut buf, num2, num);
            buf
        }

        MultiplePositionVibration => {
            let mode = TriggerMode::PULSE_B2;
            let Some(frequency) = get(extras, 0) else {
                return zero_with_mode(mode);
            };
            let mut amplitudes = [0u8; 10];
            for (i, slot) in amplitudes.iter_mut().enumerate() {
                let Some(a) = get(extras, i + 1) else {
                    return zero_with_mode(mode);
                };
                *slot = a;
            }
            if frequency == 0 || amplitudes.iter().all(|&a| a == 0) {
                return zero_with_mode(mode);
            }
            let (num2, num) = pack_grid(&amplitudes);
            let mut buf = zero_with_mode(mode);
            write_grid(&mut buf, num2, num);
            buf[9] = frequency;
            buf
        }

        Weapon => {
            let mode = TriggerMode::RIGID_AB;
            let (Some(start_pos), Some(end_pos), Some(strength)) =
                (get(extras, 0), get(extras, 1), get(extras, 2))
            else {
                return zero_with_mode(mode);
            };
            if !(start_pos <= 7 && start_pos >= 2 && end_pos <= 8 && end_pos > start_pos && strength <= 8)
            {
                return zero_with_mode(mode);
            }
            if strength == 0 {
                return zero_with_mode(mode);
            }
            let mut buf = zero_with_mode(mode);
            let mask: u16 = (1u16 << start_pos) | (1u16 << end_pos);
            buf[1] = (mask & 0xFF) as u8;
            buf[2] = (mask >> 8) as u8;
            buf[3] = strength - 1;
            buf
        }

        SemiAutomaticGun => {
            let mode = TriggerMode::RIGID_AB;
            let (Some(start), Some(end), Some(force)) =
                (get(extras, 0), get(extras, 1), get(extras, 2))
            else {
                return zero_with_mode(mode);
            };
            if !(start <= 7 && start >= 2 && end <= 8 && end > start && force <= 8 && force > 0) {
                return zero_with_mode(mode);
            }
            let mut buf = zero_with_mode(mode);
            let mask: u16 = (1u16 << start) | (1u16 << end);
            buf[1] = (mask & 0xFF) as u8;
            buf[2] = (mask >> 8) as u8;
            buf[3] = force - 1;
            buf
        }

        AutomaticGun => {
            let mode = TriggerMode::PULSE_B2;
            let (Some(start), Some(strength), Some(frequency)) =
                (get(extras, 0), get(extras, 1), get(extras, 2))
            else {
                return zero_with_mode(mode);
            };
            if !(start <= 9 && strength <= 8 && strength > 0 && frequency > 0) {
                return zero_with_mode(mode);
            }
            let mut strengths = [0u8; 10];
            for s in &mut strengths[start as usize..10] {
                *s = strength;
            }
            let (num2, num) = pack_grid(&strengths);
            let mut buf = zero_with_mode(mode);
            write_grid(&mut buf, num2, num);
            buf[8] = frequency;
            buf
        }

        Custom => {
            let Some(mode_byte) = get(extras, 0) else {
                return [0u8; TRIGGER_BLOCK_SIZE];
            };
            let mut buf = zero_with_mode(TriggerMode(mode_byte));
            for i in 1..=7 {
                let Some(b) = get(extras, i) else { break };
                buf[i] = b;
            }
            buf
        }
    }
}

/// Profiles whose encoding depends on a precondition over `extras` and
/// which therefore have a "degraded" all-zero-after-mode output distinct
/// from any legitimate encoding.
const PARAMETRIC_PROFILES: &[TriggerProfile] = &[
    TriggerProfile::Bow,
    TriggerProfile::Resistance,
    TriggerProfile::Galloping,
    TriggerProfile::Machine,
    TriggerProfile::Feedback,
    TriggerProfile::Vibration,
    TriggerProfile::SlopeFeedback,
    TriggerProfile::MultiplePositionVibration,
    TriggerProfile::Weapon,
    TriggerProfile::SemiAutomaticGun,
    TriggerProfile::AutomaticGun,
    TriggerProfile::Custom,
];

/// Strict variant of `encode` used by tests that want to assert a
/// precondition failure rather than silently accept the degraded zero
/// block. Production code calls `encode` directly; this is not on the
/// device-write path.
pub fn encode_strict(profile: TriggerProfile, extras: &[u8]) -> Result<[u8; TRIGGER_BLOCK_SIZE], AgentError> {
    let block = encode(profile, extras);
    if PARAMETRIC_PROFILES.contains(&profile) && block[1..].iter().all(|&b| b == 0) {
        return Err(AgentError::EncoderPreconditionViolated(profile));
    }
    Ok(block)
}
