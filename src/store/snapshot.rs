//! Snapshot load and rewrite.
//!
//! The hash file is a headerless concatenation of fixed-width record
//! images. Load reads it whole-record-at-a-time at startup; sync rewrites
//! it in place (truncate, then append every live record), evicting records
//! older than the TTL as it walks the buckets. A sync is considered only
//! when enough modifications have accumulated, except on shutdown where it
//! is forced.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::store::record::{Record, RECORD_SIZE};
use crate::store::{unix_now, HashIndex};

/// Load the hash file into the index. A missing file is a legitimate first
/// start and yields an empty index; a truncated trailing record is
/// discarded with a warning. Returns the number of records loaded.
pub fn load(index: &HashIndex, path: &Path) -> Result<usize> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no hash file yet, starting empty");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut buf = [0u8; RECORD_SIZE];
    let mut loaded = 0;

    loop {
        let n = read_up_to(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        if n < RECORD_SIZE {
            tracing::warn!(garbage = n, "ignoring garbage at the end of the hash file");
            break;
        }
        index.insert_loaded(Record::try_from(&buf[..])?);
        loaded += 1;
    }

    tracing::info!(records = loaded, path = %path.display(), "hash file loaded");
    Ok(loaded)
}

/// Rewrite the hash file from the index, evicting expired records.
///
/// Skips (returning `Ok(false)`) unless the modification counter has
/// reached `mod_limit` or `force` is set. The counter is reset only after
/// a fully successful rewrite, so an IO error leaves it in place and the
/// next cycle retries.
pub fn sync(
    index: &HashIndex,
    path: &Path,
    expire: Duration,
    mod_limit: u32,
    force: bool,
) -> Result<bool> {
    if !force && index.mods() < mod_limit {
        return Ok(false);
    }

    tracing::info!(records = index.len(), mods = index.mods(), "syncing fuzzy hash storage");

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)?;
    let mut writer = BufWriter::new(file);

    let now = unix_now();
    let expire_secs = expire.as_secs();
    let mut written = 0usize;
    let mut expired = 0usize;

    for bucket in index.buckets() {
        let mut bucket = bucket.write().unwrap();
        let mut bloom = index.bloom().write().unwrap();
        let mut io_result = Ok(());

        bucket.retain(|record| {
            if record.age(now) > expire_secs {
                bloom.del(&record.hash.pipe);
                expired += 1;
                return false;
            }
            if io_result.is_ok() {
                io_result = record.encode(&mut writer);
                if io_result.is_ok() {
                    written += 1;
                }
            }
            true
        });

        io_result?;
    }

    writer.flush()?;
    index.reset_mods();

    tracing::info!(written, expired, path = %path.display(), "hash storage synced");
    Ok(true)
}

/// Read up to `buf.len()` bytes, short only at end of stream.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut pos = 0;
    while pos < buf.len() {
        match reader.read(&mut buf[pos..]) {
            Ok(0) => break,
            Ok(n) => pos += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(pos)
}
