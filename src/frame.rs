use crate::error::Error;

/// 256 MiB: the maximum payload carried by a single WebSocket fragment
/// (spec §4.D).
pub const MAX_FRAME_PAYLOAD: usize = 256 << 20;

/// 1 GiB: the maximum size of a reassembled (possibly fragmented) message
/// (spec §4.D).
pub const MAX_MESSAGE_PAYLOAD: usize = 1 << 30;

/// Maximum payload for a control frame (PING/PONG/CLOSE), per RFC 6455.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            _ => Err(Error::InvalidOpcode),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary | OpCode::Continuation)
    }
}

/// One RFC 6455 WebSocket protocol unit, after unmasking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self { fin, opcode, payload }
    }

    pub fn close(code: u16, reason: &str) -> Result<Self, Error> {
        if reason.len() > MAX_CONTROL_PAYLOAD - 2 {
            return Err(Error::ControlFramePayloadSize);
        }
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Ok(Frame::new(true, OpCode::Close, payload))
    }

    pub fn ping(payload: Vec<u8>) -> Result<Self, Error> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::ControlFramePayloadSize);
        }
        Ok(Frame::new(true, OpCode::Ping, payload))
    }

    pub fn pong(payload: Vec<u8>) -> Result<Self, Error> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::ControlFramePayloadSize);
        }
        Ok(Frame::new(true, OpCode::Pong, payload))
    }

    /// Parses the big-endian `u16` close code and UTF-8 reason out of a
    /// CLOSE frame's payload, if present.
    pub fn close_code_and_reason(&self) -> Option<(u16, String)> {
        if self.opcode != OpCode::Close || self.payload.len() < 2 {
            return None;
        }
        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let reason = String::from_utf8_lossy(&self.payload[2..]).into_owned();
        Some((code, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_byte() {
        for (byte, opcode) in [
            (0x0, OpCode::Continuation),
            (0x1, OpCode::Text),
            (0x2, OpCode::Binary),
            (0x8, OpCode::Close),
            (0x9, OpCode::Ping),
            (0xA, OpCode::Pong),
        ] {
            let parsed = OpCode::from_byte(byte).unwrap();
            assert_eq!(parsed, opcode);
            assert_eq!(parsed.as_u8(), byte);
        }
        assert!(OpCode::from_byte(0x3).is_err());
    }

    #[test]
    fn control_opcodes_are_flagged() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Binary.is_control());
        assert!(!OpCode::Continuation.is_control());
    }

    #[test]
    fn close_frame_carries_code_and_reason() {
        let frame = Frame::close(1000, "bye").unwrap();
        let (code, reason) = frame.close_code_and_reason().unwrap();
        assert_eq!(code, 1000);
        assert_eq!(reason, "bye");
    }

    #[test]
    fn close_frame_reason_too_long_is_rejected() {
        let reason = "x".repeat(200);
        assert!(Frame::close(1000, &reason).is_err());
    }
}
