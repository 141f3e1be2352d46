//! Frame codec and the incremental parser

use heapless::Vec;

/// Synchronisation byte opening every frame
pub const FRAME_SYNC: u8 = 0xA5;

/// Largest payload a frame carries
pub const MAX_PAYLOAD: usize = 24;

/// Complete frame size: SYNC + LENGTH + TYPE + payload + CHECKSUM
pub const MAX_FRAME: usize = MAX_PAYLOAD + 4;

/// Checksum seed, so an all-zero stream is not a valid frame
const CHECKSUM_SEED: u8 = 0x5A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds [`MAX_PAYLOAD`]
    TooLong,
    /// Checksum mismatch on receive
    Checksum,
    /// Frame structure or message content is invalid
    Malformed,
}

/// One parsed or constructed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u8,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

impl Frame {
    pub fn new(msg_type: u8, payload: &[u8]) -> Result<Self, FrameError> {
        let mut vec = Vec::new();
        vec.extend_from_slice(payload).map_err(|_| FrameError::TooLong)?;
        Ok(Self {
            msg_type,
            payload: vec,
        })
    }

    pub fn empty(msg_type: u8) -> Self {
        Self {
            msg_type,
            payload: Vec::new(),
        }
    }

    fn checksum(length: u8, msg_type: u8, payload: &[u8]) -> u8 {
        payload
            .iter()
            .fold(CHECKSUM_SEED ^ length ^ msg_type, |acc, &b| acc ^ b)
    }

    /// Serialise into `out`, returning the encoded frame
    pub fn encode(&self) -> Vec<u8, MAX_FRAME> {
        let mut out = Vec::new();
        let length = self.payload.len() as u8;
        let _ = out.push(FRAME_SYNC);
        let _ = out.push(length);
        let _ = out.push(self.msg_type);
        let _ = out.extend_from_slice(&self.payload);
        let _ = out.push(Self::checksum(length, self.msg_type, &self.payload));
        out
    }
}

/// Byte-at-a-time frame assembler
///
/// Garbage between frames is skipped while hunting for the sync byte; a
/// bad checksum drops the frame and resynchronises.
pub struct FrameParser {
    state: State,
    msg_type: u8,
    expect: u8,
    payload: Vec<u8, MAX_PAYLOAD>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sync,
    Length,
    Type,
    Payload,
    Checksum,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub const fn new() -> Self {
        Self {
            state: State::Sync,
            msg_type: 0,
            expect: 0,
            payload: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state = State::Sync;
        self.payload.clear();
    }

    /// Feed one received byte
    ///
    /// Returns a complete frame when its checksum verifies.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Frame>, FrameError> {
        match self.state {
            State::Sync => {
                if byte == FRAME_SYNC {
                    self.state = State::Length;
                }
                Ok(None)
            }
            State::Length => {
                if byte as usize > MAX_PAYLOAD {
                    self.reset();
                    return Err(FrameError::Malformed);
                }
                self.expect = byte;
                self.state = State::Type;
                Ok(None)
            }
            State::Type => {
                self.msg_type = byte;
                self.payload.clear();
                self.state = if self.expect == 0 {
                    State::Checksum
                } else {
                    State::Payload
                };
                Ok(None)
            }
            State::Payload => {
                let _ = self.payload.push(byte);
                if self.payload.len() == self.expect as usize {
                    self.state = State::Checksum;
                }
                Ok(None)
            }
            State::Checksum => {
                let expected = Frame::checksum(self.expect, self.msg_type, &self.payload);
                let frame = Frame {
                    msg_type: self.msg_type,
                    payload: self.payload.clone(),
                };
                self.reset();
                if byte == expected {
                    Ok(Some(frame))
                } else {
                    Err(FrameError::Checksum)
                }
            }
        }
    }

    /// Feed a chunk, returning the first complete frame
    pub fn feed_slice(&mut self, bytes: &[u8]) -> Result<Option<Frame>, FrameError> {
        for &byte in bytes {
            if let Some(frame) = self.feed(byte)? {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}
