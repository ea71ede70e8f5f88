//! Capture files: saved records for later replay.
//!
//! Layout:
//!
//! ```text
//! "RVSC" | version u8 | entry*
//! entry = sequence u64 | timestamp i64 | len u32 | message[len] | crc32(message) u32
//! ```
//!
//! Integers are little-endian. Messages are stored in their encoded
//! form and decoded as [`FieldMessage`](crate::message::FieldMessage) on
//! load. The saved sequence number is informational: loaded records get
//! fresh ones.

use crate::error::{LedgerError, Result};
use crate::records::Record;
use crate::types::Timestamp;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

const CAPTURE_MAGIC: &[u8; 4] = b"RVSC";

const CAPTURE_VERSION: u8 = 1;

/// Refuse entries larger than this rather than allocating for garbage.
const MAX_ENTRY_LEN: usize = 64 * 1024 * 1024;

/// Write `records` to `writer`. Records whose message cannot be encoded,
/// or that would be too large to load back, are skipped. Returns the
/// number written.
pub fn write_capture<'a, W: Write>(
    writer: &mut W,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<usize> {
    write_entries(writer, records, MAX_ENTRY_LEN)
}

fn write_entries<'a, W: Write>(
    writer: &mut W,
    records: impl IntoIterator<Item = &'a Record>,
    max_entry_len: usize,
) -> Result<usize> {
    writer.write_all(CAPTURE_MAGIC)?;
    writer.write_all(&[CAPTURE_VERSION])?;

    let mut written = 0;
    for record in records {
        let encoded = match record.message().encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(sequence = record.sequence().0, error = %e, "not saving unencodable record");
                continue;
            }
        };
        let len = match u32::try_from(encoded.len()) {
            Ok(len) if encoded.len() <= max_entry_len => len,
            _ => {
                warn!(
                    sequence = record.sequence().0,
                    size = encoded.len(),
                    "not saving oversized record"
                );
                continue;
            }
        };

        writer.write_all(&record.sequence().0.to_le_bytes())?;
        writer.write_all(&record.timestamp().0.to_le_bytes())?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&encoded)?;
        writer.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
        written += 1;
    }
    writer.flush()?;
    debug!(written, "wrote capture");
    Ok(written)
}

/// Read every record from `reader`. Loaded records have no connection,
/// keep their saved timestamp and get new sequence numbers.
pub fn read_capture<R: Read>(reader: &mut R) -> Result<Vec<Record>> {
    let mut magic = [0u8; 4];
    read_exact(reader, &mut magic)?;
    if &magic != CAPTURE_MAGIC {
        return Err(LedgerError::InvalidFormat("not a capture file".into()));
    }
    let mut version = [0u8; 1];
    read_exact(reader, &mut version)?;
    if version[0] != CAPTURE_VERSION {
        return Err(LedgerError::InvalidFormat(format!(
            "unsupported capture version: {}",
            version[0]
        )));
    }

    let mut records = Vec::new();
    let mut sequence = [0u8; 8];
    while fill_or_eof(reader, &mut sequence)? {
        let mut timestamp = [0u8; 8];
        read_exact(reader, &mut timestamp)?;
        let timestamp = Timestamp(i64::from_le_bytes(timestamp));

        let mut len = [0u8; 4];
        read_exact(reader, &mut len)?;
        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_ENTRY_LEN {
            return Err(LedgerError::InvalidFormat(format!("entry of {len} bytes")));
        }
        let mut message = vec![0u8; len];
        read_exact(reader, &mut message)?;

        let mut checksum = [0u8; 4];
        read_exact(reader, &mut checksum)?;
        let expected = u32::from_le_bytes(checksum);
        let got = crc32fast::hash(&message);
        if expected != got {
            return Err(LedgerError::ChecksumMismatch { expected, got });
        }

        records.push(Record::from_bytes(&message, Some(timestamp))?);
    }
    debug!(loaded = records.len(), "read capture");
    Ok(records)
}

/// Save `records` to the file at `path`, replacing it.
pub fn save_capture<'a>(
    path: impl AsRef<Path>,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_capture(&mut writer, records)
}

pub fn load_capture(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let mut reader = BufReader::new(File::open(path)?);
    read_capture(&mut reader)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => LedgerError::InvalidFormat("truncated capture".into()),
        _ => LedgerError::Io(e),
    })
}

/// Fill `buf`. Returns false if the input ends before the first byte.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(LedgerError::InvalidFormat("truncated capture".into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
