use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{timeout, Duration};

use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::frame::{Frame, OpCode, MAX_CONTROL_PAYLOAD, MAX_MESSAGE_PAYLOAD};
use crate::message::Message;

/// Which end of the connection this codec instance speaks for. Dictates
/// masking direction: a client masks outbound frames and expects unmasked
/// inbound ones; a server does the opposite. This crate is server-first,
/// so `Client` exists mainly for the dial-path symmetry spec.md §4.D
/// describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads and reassembles RFC 6455 frames off an async byte stream.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    role: Role,
    config: WebSocketConfig,
    fragment: Option<Fragment>,
}

struct Fragment {
    opcode: OpCode,
    payload: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, role: Role, config: WebSocketConfig) -> Self {
        FrameReader {
            reader: BufReader::new(reader),
            role,
            config,
            fragment: None,
        }
    }

    /// Reads and unmasks a single frame off the wire, with no reassembly.
    pub async fn read_frame(&mut self) -> Result<Frame, Error> {
        let mut header = [0u8; 2];
        self.reader.read_exact(&mut header).await?;

        let fin = (header[0] & 0b1000_0000) != 0;
        let rsv1 = (header[0] & 0b0100_0000) != 0;
        let rsv2 = (header[0] & 0b0010_0000) != 0;
        let rsv3 = (header[0] & 0b0001_0000) != 0;
        if rsv1 || rsv2 || rsv3 {
            return Err(Error::RsvNotZero);
        }
        let opcode = OpCode::from_byte(header[0] & 0b0000_1111)?;

        if !fin && opcode.is_control() {
            return Err(Error::ControlFramesFragmented);
        }

        let masked = (header[1] & 0b1000_0000) != 0;
        match self.role {
            Role::Server if !masked => return Err(Error::MaskRequired),
            Role::Client if masked => return Err(Error::UnexpectedMask),
            _ => {}
        }

        let mut len = (header[1] & 0b0111_1111) as u64;
        if opcode.is_control() && len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(Error::ControlFramePayloadSize);
        }
        if len == 126 {
            let mut ext = [0u8; 2];
            self.reader.read_exact(&mut ext).await?;
            len = u16::from_be_bytes(ext) as u64;
        } else if len == 127 {
            let mut ext = [0u8; 8];
            self.reader.read_exact(&mut ext).await?;
            len = u64::from_be_bytes(ext);
        }
        if len > self.config.max_frame_size as u64 {
            return Err(Error::MaxFrameSize);
        }
        let len = len as usize;

        let mask = if masked {
            let mut key = [0u8; 4];
            self.reader.read_exact(&mut key).await?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; len];
        timeout(READ_TIMEOUT, self.reader.read_exact(&mut payload)).await??;

        if let Some(key) = mask {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= key[i % 4];
            }
        }

        Ok(Frame::new(fin, opcode, payload))
    }

    /// Reads frames until a complete message (single frame, or a
    /// CONTINUATION-reassembled sequence) is available, or a control frame
    /// arrives — returned as-is so the caller can answer PING/CLOSE inline.
    pub async fn read_message(&mut self) -> Result<Result<Message, Frame>, Error> {
        loop {
            let frame = self.read_frame().await?;
            match frame.opcode {
                OpCode::Text | OpCode::Binary if !frame.fin => {
                    if self.fragment.is_some() {
                        return Err(Error::InvalidFrameFragmentation);
                    }
                    self.fragment = Some(Fragment { opcode: frame.opcode, payload: frame.payload });
                }
                OpCode::Text | OpCode::Binary => {
                    if self.fragment.is_some() {
                        return Err(Error::InvalidFrameFragmentation);
                    }
                    return Ok(Ok(Message::from_frame(frame)?));
                }
                OpCode::Continuation => {
                    let in_progress = self
                        .fragment
                        .as_mut()
                        .ok_or(Error::InvalidContinuationFrame)?;
                    if in_progress.payload.len() + frame.payload.len() > MAX_MESSAGE_PAYLOAD {
                        self.fragment = None;
                        return Err(Error::MaxMessageSize);
                    }
                    in_progress.payload.extend_from_slice(&frame.payload);
                    if frame.fin {
                        let done = self.fragment.take().unwrap();
                        let reassembled = Frame::new(true, done.opcode, done.payload);
                        return Ok(Ok(Message::from_frame(reassembled)?));
                    }
                }
                OpCode::Close | OpCode::Ping | OpCode::Pong => return Ok(Err(frame)),
            }
        }
    }
}

/// Writes RFC 6455 frames to an async byte stream, masking when acting as
/// a client.
pub struct FrameWriter<W> {
    writer: W,
    role: Role,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, role: Role) -> Self {
        FrameWriter { writer, role }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        let first_byte = ((frame.fin as u8) << 7) | frame.opcode.as_u8();
        self.writer.write_all(&[first_byte]).await?;

        let len = frame.payload.len();
        let mask_bit = if self.role == Role::Client { 0b1000_0000 } else { 0 };

        if len <= 125 {
            self.writer.write_all(&[mask_bit | len as u8]).await?;
        } else if len <= u16::MAX as usize {
            let len_bytes = (len as u16).to_be_bytes();
            self.writer
                .write_all(&[mask_bit | 126, len_bytes[0], len_bytes[1]])
                .await?;
        } else {
            let len_bytes = (len as u64).to_be_bytes();
            let mut header = Vec::with_capacity(9);
            header.push(mask_bit | 127);
            header.extend_from_slice(&len_bytes);
            self.writer.write_all(&header).await?;
        }

        if self.role == Role::Client {
            let mask = rand::random::<[u8; 4]>();
            self.writer.write_all(&mask).await?;
            let masked: Vec<u8> = frame
                .payload
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ mask[i % 4])
                .collect();
            self.writer.write_all(&masked).await?;
        } else {
            self.writer.write_all(&frame.payload).await?;
        }

        self.writer.flush().await?;
        Ok(())
    }
}
