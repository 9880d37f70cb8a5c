//! The binary command protocol.
//!
//! Clients send one fixed-width [`FuzzyCommand`] frame per connection and
//! receive a single textual reply, `OK\r\n` or `ERR\r\n`. There is no
//! greeting and no negotiation. The frame is the raw image of the C
//! client's command struct, alignment padding included; integers are
//! host-endian by contract.

pub mod session;

use crate::error::Result;
use crate::fuzzy::{FuzzyHash, HASH_PIPE_LEN};
use crate::{errdata, Error};

/// Wire size of one command frame:
///
/// ```text
/// offset 0       cmd         u8
/// offset 1..4    padding     (3 bytes)
/// offset 4..8    block_size  u32, native endian
/// offset 8..72   pipe
/// ```
pub const COMMAND_SIZE: usize = 72;

pub const FUZZY_CHECK: u8 = 0;
pub const FUZZY_WRITE: u8 = 1;
pub const FUZZY_DEL: u8 = 2;

/// A recognized command operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Check,
    Write,
    Delete,
}

impl Op {
    pub fn code(self) -> u8 {
        match self {
            Op::Check => FUZZY_CHECK,
            Op::Write => FUZZY_WRITE,
            Op::Delete => FUZZY_DEL,
        }
    }
}

/// A decoded command frame. The raw command byte is preserved so that an
/// unrecognized value can still be answered with `ERR`.
#[derive(Clone, Copy, Debug)]
pub struct FuzzyCommand {
    pub cmd: u8,
    pub hash: FuzzyHash,
}

impl FuzzyCommand {
    pub fn new(op: Op, hash: FuzzyHash) -> Self {
        Self {
            cmd: op.code(),
            hash,
        }
    }

    /// The operation, if the command byte is recognized.
    pub fn op(&self) -> Option<Op> {
        match self.cmd {
            FUZZY_CHECK => Some(Op::Check),
            FUZZY_WRITE => Some(Op::Write),
            FUZZY_DEL => Some(Op::Delete),
            _ => None,
        }
    }

    /// Encode the wire image of this command.
    pub fn encode(&self) -> [u8; COMMAND_SIZE] {
        let mut buf = [0u8; COMMAND_SIZE];
        buf[0] = self.cmd;
        buf[4..8].copy_from_slice(&self.hash.block_size.to_ne_bytes());
        buf[8..].copy_from_slice(&self.hash.pipe);
        buf
    }
}

impl TryFrom<&[u8]> for FuzzyCommand {
    type Error = Error;

    fn try_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < COMMAND_SIZE {
            return errdata!("short command frame: {} of {} bytes", buf.len(), COMMAND_SIZE);
        }

        let mut block_size = [0u8; 4];
        block_size.copy_from_slice(&buf[4..8]);
        let mut pipe = [0u8; HASH_PIPE_LEN];
        pipe.copy_from_slice(&buf[8..COMMAND_SIZE]);

        Ok(Self {
            cmd: buf[0],
            hash: FuzzyHash::new(pipe, u32::from_ne_bytes(block_size)),
        })
    }
}

/// The textual reply line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Err,
}

impl Reply {
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Reply::Ok => b"OK\r\n",
            Reply::Err => b"ERR\r\n",
        }
    }

    pub fn from_outcome(found: bool) -> Self {
        if found {
            Reply::Ok
        } else {
            Reply::Err
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash() -> FuzzyHash {
        let mut pipe = [0u8; HASH_PIPE_LEN];
        for (i, byte) in pipe.iter_mut().enumerate() {
            *byte = i as u8;
        }
        FuzzyHash::new(pipe, 0xdead_beef)
    }

    #[test]
    fn test_command_roundtrip() {
        let cmd = FuzzyCommand::new(Op::Write, sample_hash());
        let wire = cmd.encode();
        assert_eq!(wire.len(), COMMAND_SIZE);

        let decoded = FuzzyCommand::try_from(&wire[..]).expect("Failed to decode command");
        assert_eq!(decoded.op(), Some(Op::Write));
        assert_eq!(decoded.hash, cmd.hash);
    }

    #[test]
    fn test_command_layout() {
        let cmd = FuzzyCommand::new(Op::Delete, sample_hash());
        let wire = cmd.encode();

        assert_eq!(wire[0], FUZZY_DEL);
        assert_eq!(wire[1..4], [0u8; 3]);
        assert_eq!(wire[4..8], 0xdead_beefu32.to_ne_bytes());
        assert_eq!(wire[8], 0);
        assert_eq!(wire[71], 63);
    }

    #[test]
    fn test_unknown_command_byte_survives_decode() {
        let mut wire = FuzzyCommand::new(Op::Check, sample_hash()).encode();
        wire[0] = 0xff;

        let decoded = FuzzyCommand::try_from(&wire[..]).expect("Failed to decode command");
        assert_eq!(decoded.op(), None);
        assert_eq!(decoded.cmd, 0xff);
    }

    #[test]
    fn test_short_frame_is_rejected() {
        let wire = [0u8; COMMAND_SIZE - 1];
        assert!(matches!(
            FuzzyCommand::try_from(&wire[..]),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_reply_lines() {
        assert_eq!(Reply::Ok.as_bytes(), b"OK\r\n");
        assert_eq!(Reply::Err.as_bytes(), b"ERR\r\n");
        assert_eq!(Reply::from_outcome(true), Reply::Ok);
        assert_eq!(Reply::from_outcome(false), Reply::Err);
    }
}
