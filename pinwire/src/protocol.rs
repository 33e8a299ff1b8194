// protocol.rs — Host/firmware wire protocol
//
// Single source of truth for the serial framing shared by the firmware
// generator and the host client: link constants, command encoding, reply
// parsing, value normalization and the number grammar both sides accept.
//
// Lines are ASCII, one command per line, terminated by `\n` (the device also
// accepts `\r`). Two opcodes exist:
//
//   host→device  S:<index>:<value>   set a control slot
//   device→host  OK:S:<index>        acknowledge a set
//   host→device  G:<index>           request a control slot
//   device→host  R:<index>:<value>   current slot value
//
// Malformed or out-of-range lines get no reply at all.
//
// Values are parsed as `long` and stored with an `(int)` cast, so their range
// is the target's `int`: 16-bit on AVR boards (`S:0:40000` reads back as
// `R:0:-25536` on an Uno), 32-bit on ARM and ESP cores.

use std::fmt;

// ── Link constants ──────────────────────────────────────────────────────────

/// Baud rate used by both `Serial.begin()` in generated firmware and the host
/// transport.
pub const BAUD_RATE: u32 = 9600;

/// Capacity of the firmware line buffer, including the NUL terminator.
/// At most `LINE_BUFFER_CAPACITY - 1` payload bytes are kept per line.
pub const LINE_BUFFER_CAPACITY: usize = 64;

/// Terminator appended to every host command.
pub const LINE_TERMINATOR: char = '\n';

pub const SET_OPCODE: char = 'S';
pub const GET_OPCODE: char = 'G';
pub const REPLY_OPCODE: &str = "R";
pub const ACK_PREFIX: &str = "OK:S:";

/// Whether `byte` ends a line on the device side.
pub fn is_line_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

// ── Host commands ───────────────────────────────────────────────────────────

/// A command the host sends to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Set { index: usize, value: i64 },
    Get { index: usize },
}

impl Command {
    pub fn index(&self) -> usize {
        match self {
            Command::Set { index, .. } | Command::Get { index } => *index,
        }
    }

    /// Encode as a terminated wire line.
    pub fn encode(&self) -> String {
        format!("{}{}", self, LINE_TERMINATOR)
    }

    /// The acknowledgement prefix a device sends for this command, if the
    /// command is acknowledged by prefix (sets only).
    pub fn expected_ack(&self) -> Option<String> {
        match self {
            Command::Set { index, .. } => Some(format!("{}{}", ACK_PREFIX, index)),
            Command::Get { .. } => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Set { index, value } => write!(f, "{}:{}:{}", SET_OPCODE, index, value),
            Command::Get { index } => write!(f, "{}:{}", GET_OPCODE, index),
        }
    }
}

// ── Device replies ──────────────────────────────────────────────────────────

/// A reply line received from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    SetAck { index: i64 },
    Value { index: i64, value: i64 },
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::SetAck { index } => write!(f, "{}{}", ACK_PREFIX, index),
            Reply::Value { index, value } => write!(f, "{}:{}:{}", REPLY_OPCODE, index, value),
        }
    }
}

/// Why a `G` reply could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueReplyError {
    /// Wrong field count, wrong opcode, or a different index.
    Unexpected,
    /// Shape and index matched but the value field is not an integer.
    InvalidValue,
}

/// Parse a `R:<index>:<value>` reply and check it answers `expected_index`.
pub fn parse_value_reply(line: &str, expected_index: usize) -> Result<i64, ValueReplyError> {
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() != 3 || parts[0] != REPLY_OPCODE || parts[1] != expected_index.to_string() {
        return Err(ValueReplyError::Unexpected);
    }
    parts[2]
        .trim()
        .parse::<i64>()
        .map_err(|_| ValueReplyError::InvalidValue)
}

/// Whether `line` acknowledges a set of `index`.
pub fn is_set_ack(line: &str, index: usize) -> bool {
    line.starts_with(&format!("{}{}", ACK_PREFIX, index))
}

// ── Value normalization ─────────────────────────────────────────────────────

/// Normalize a user-facing value to the integer stored in a control slot.
///
/// `HIGH` → 1 and `LOW` → 0 (case-insensitive, surrounding whitespace
/// ignored); anything else must parse as a number. Fractional values are
/// truncated toward zero.
pub fn normalize_value(raw: &str) -> Option<i64> {
    let text = raw.trim();
    if text.eq_ignore_ascii_case("HIGH") {
        return Some(1);
    }
    if text.eq_ignore_ascii_case("LOW") {
        return Some(0);
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let f = text.parse::<f64>().ok()?;
    if !f.is_finite() || f >= i64::MAX as f64 || f <= i64::MIN as f64 {
        return None;
    }
    Some(f.trunc() as i64)
}

// ── Number grammar ──────────────────────────────────────────────────────────

/// Scan a device-side number at the start of `bytes`: an optional `-`
/// followed by one or more ASCII digits.
///
/// Returns the value and the number of bytes consumed, or `None` when no
/// digit follows. Mirrors `parseNumber()` in generated firmware, including
/// wrapping on overflow.
pub fn scan_number(bytes: &[u8]) -> Option<(i64, usize)> {
    let mut pos = 0;
    let negative = bytes.first() == Some(&b'-');
    if negative {
        pos += 1;
    }
    if !bytes.get(pos).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let mut value: i64 = 0;
    while let Some(&b) = bytes.get(pos) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value.wrapping_mul(10).wrapping_add(i64::from(b - b'0'));
        pos += 1;
    }
    Some((if negative { value.wrapping_neg() } else { value }, pos))
}
