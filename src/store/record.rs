use std::io::{Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;
use crate::fuzzy::{FuzzyHash, HASH_PIPE_LEN};
use crate::{errdata, Error};

/// On-disk size of one record.
///
/// The layout is the raw image of the C producer's in-memory struct on LP64
/// platforms, alignment padding included:
///
/// ```text
/// offset  0..64   pipe
/// offset 64..68   block_size  u32, native endian
/// offset 68..72   padding     (4 zero bytes)
/// offset 72..80   time        u64, native endian
/// ```
///
/// Integers are host-endian by contract; files do not move between
/// platforms of different endianness.
pub const RECORD_SIZE: usize = 80;

const RECORD_PAD: usize = 4;

/// A stored fuzzy hash and its insertion time (seconds since epoch). The
/// time is used only for TTL expiry during snapshotting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    pub hash: FuzzyHash,
    pub time: u64,
}

impl Record {
    pub fn new(hash: FuzzyHash, time: u64) -> Self {
        Self { hash, time }
    }

    /// Age of the record in seconds at the given wall-clock time.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.time)
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.hash.pipe)?;
        writer.write_u32::<NativeEndian>(self.hash.block_size)?;
        writer.write_all(&[0u8; RECORD_PAD])?;
        writer.write_u64::<NativeEndian>(self.time)?;
        Ok(())
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut pipe = [0u8; HASH_PIPE_LEN];
        reader.read_exact(&mut pipe)?;
        let block_size = reader.read_u32::<NativeEndian>()?;
        let mut pad = [0u8; RECORD_PAD];
        reader.read_exact(&mut pad)?;
        let time = reader.read_u64::<NativeEndian>()?;
        Ok(Self {
            hash: FuzzyHash::new(pipe, block_size),
            time,
        })
    }
}

impl TryFrom<&[u8]> for Record {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RECORD_SIZE {
            return errdata!("short record: {} of {} bytes", bytes.len(), RECORD_SIZE);
        }
        Record::decode(&mut &bytes[..])
    }
}

impl TryFrom<&Record> for Vec<u8> {
    type Error = Error;

    fn try_from(record: &Record) -> Result<Self> {
        let mut buf = Vec::with_capacity(RECORD_SIZE);
        record.encode(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_encoding_decoding() {
        let record = Record::new(FuzzyHash::new([0x5a; HASH_PIPE_LEN], 768), 1_700_000_000);

        let encoded: Vec<u8> = (&record).try_into().expect("Failed to encode record");
        assert_eq!(encoded.len(), RECORD_SIZE);

        let decoded = Record::try_from(&encoded[..]).expect("Failed to decode record");
        assert_eq!(record, decoded);
    }

    #[test]
    fn test_record_layout_offsets() {
        let mut pipe = [0u8; HASH_PIPE_LEN];
        pipe[0] = 0xaa;
        pipe[63] = 0xbb;
        let record = Record::new(FuzzyHash::new(pipe, 0x0102_0304), 0x1112_1314_1516_1718);

        let encoded: Vec<u8> = (&record).try_into().unwrap();
        assert_eq!(encoded[0], 0xaa);
        assert_eq!(encoded[63], 0xbb);
        assert_eq!(encoded[64..68], 0x0102_0304u32.to_ne_bytes());
        assert_eq!(encoded[68..72], [0u8; 4]);
        assert_eq!(encoded[72..80], 0x1112_1314_1516_1718u64.to_ne_bytes());
    }

    #[test]
    fn test_decoding_short_buffer() {
        let short = vec![0u8; RECORD_SIZE - 1];
        let result = Record::try_from(&short[..]);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_record_age() {
        let record = Record::new(FuzzyHash::new([0; HASH_PIPE_LEN], 1), 100);
        assert_eq!(record.age(150), 50);
        assert_eq!(record.age(100), 0);
        // A clock that moved backwards does not produce a huge age.
        assert_eq!(record.age(50), 0);
    }
}
