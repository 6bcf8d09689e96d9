use crate::error::Error;
use crate::frame::{Frame, OpCode, MAX_MESSAGE_PAYLOAD};

/// A reassembled, application-visible unit exchanged over either
/// sub-transport. WebSocket fragmentation and the long-polling envelope
/// both collapse into this before reaching the façade.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    /// Builds a `Message` from a single, already-reassembled data frame.
    pub fn from_frame(frame: Frame) -> Result<Self, Error> {
        match frame.opcode {
            OpCode::Text => Ok(Message::Text(String::from_utf8(frame.payload)?)),
            OpCode::Binary => Ok(Message::Binary(frame.payload)),
            _ => Err(Error::InvalidOpcode),
        }
    }

    pub fn as_binary(&self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.clone(),
        }
    }

    pub fn as_text(&self) -> Result<String, Error> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Binary(data) => Ok(String::from_utf8(data.clone())?),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the message into a sequence of frames no larger than
    /// `max_frame_size` each, fin-bit set on the last one only.
    pub fn to_frames(self, max_frame_size: usize) -> Result<Vec<Frame>, Error> {
        if self.len() > MAX_MESSAGE_PAYLOAD {
            return Err(Error::MaxMessageSize);
        }

        let opcode = match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        };
        let payload = match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        };

        if payload.is_empty() {
            return Ok(vec![Frame::new(true, opcode, payload)]);
        }

        let mut frames: Vec<Frame> = Vec::new();
        for chunk in payload.chunks(max_frame_size) {
            let chunk_opcode = if frames.is_empty() { opcode } else { OpCode::Continuation };
            frames.push(Frame::new(false, chunk_opcode, chunk.to_vec()));
        }
        if let Some(last) = frames.last_mut() {
            last.fin = true;
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_small_message_is_one_final_frame() {
        let frames = Message::Text("hello".to_string()).to_frames(1024).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
    }

    #[test]
    fn large_message_splits_with_continuation_opcodes() {
        let payload = vec![7u8; 10];
        let frames = Message::Binary(payload).to_frames(4).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].opcode, OpCode::Binary);
        assert_eq!(frames[1].opcode, OpCode::Continuation);
        assert_eq!(frames[2].opcode, OpCode::Continuation);
        assert!(!frames[0].fin);
        assert!(!frames[1].fin);
        assert!(frames[2].fin);
    }

    #[test]
    fn round_trips_through_frame() {
        let msg = Message::Text("round trip".to_string());
        let frames = msg.clone().to_frames(1024).unwrap();
        let rebuilt = Message::from_frame(frames.into_iter().next().unwrap()).unwrap();
        assert_eq!(rebuilt, msg);
    }
}
