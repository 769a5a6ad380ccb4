//! # WAL — write-ahead log
//!
//! Crash-safe durability for the storage engine. Every mutation (`Put` or
//! `Delete`) is appended here before it is applied to the active memtable,
//! so a crash can never lose an acknowledged write: recovery simply replays
//! the log from the last durable offset.
//!
//! ## Record framing
//!
//! ```text
//! [0..4)   CRC32-IEEE over bytes [4..end)
//! [4..7)   varuint: length L of the small-header region that follows
//! [7..7+L) varuints in order: op_type, key_byte_len, value_byte_len
//! [..)     key bytes (MVCC layout, see the `mvcc` crate)
//! [..)     value bytes
//! ```
//!
//! `[4..7)` is a fixed three-byte slot. The length it carries is always
//! small (a handful of varuint-encoded integers), so it is written as a
//! padded three-byte LEB128 group rather than a true variable-width varuint
//! -- the reader just keeps following continuation bits, so padding with
//! zero groups is transparent to it.
//!
//! Only `Put` and `Delete` records are ever written; control ops never
//! reach the log.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalWriter, WalReader};
//! use mvcc::{MVCCKey, OpType};
//!
//! let mut w = WalWriter::create("wal.log", true).unwrap();
//! let key = MVCCKey::new(b"hello".to_vec(), 1, OpType::Put, 0);
//! w.append(&key, b"world").unwrap();
//! w.flush().unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("wal.log").unwrap();
//! r.replay(|key, value| println!("{:?} {:?}", key, value)).unwrap();
//! ```

use crc32fast::Hasher as Crc32;
use mvcc::{MVCCKey, OpType};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

/// Default size, in bytes, of the writer's scratch buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 128;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt record")]
    Corrupt,
}

fn encode_varuint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Encodes `value` as exactly three LEB128 bytes, padding with zero groups
/// if the value fits in fewer. `value` must be `< 1 << 21`.
fn encode_varuint_fixed3(value: u32) -> [u8; 3] {
    debug_assert!(value < (1 << 21));
    [
        ((value & 0x7f) as u8) | 0x80,
        (((value >> 7) & 0x7f) as u8) | 0x80,
        ((value >> 14) & 0x7f) as u8,
    ]
}

fn decode_varuint(buf: &[u8]) -> Result<(u64, usize), WalError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return Err(WalError::Corrupt);
        }
    }
    Err(WalError::Corrupt)
}

/// Builds the full frame for a record (everything after nothing -- this
/// *is* the whole record, starting at the CRC).
fn build_frame(key: &MVCCKey, value: &[u8]) -> Vec<u8> {
    let key_bytes = key.dump_bytes();

    let mut header = Vec::with_capacity(12);
    encode_varuint(key.op_type.code() as u64, &mut header);
    encode_varuint(key_bytes.len() as u64, &mut header);
    encode_varuint(value.len() as u64, &mut header);

    let mut frame = Vec::with_capacity(4 + 3 + header.len() + key_bytes.len() + value.len());
    frame.extend_from_slice(&[0u8; 4]); // CRC placeholder
    frame.extend_from_slice(&encode_varuint_fixed3(header.len() as u32));
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&key_bytes);
    frame.extend_from_slice(value);

    let mut hasher = Crc32::new();
    hasher.update(&frame[4..]);
    let crc = hasher.finalize();
    frame[0..4].copy_from_slice(&crc.to_le_bytes());
    frame
}

/// Append-only WAL writer.
///
/// Buffers appended frames in a fixed-size (default [`DEFAULT_BUFFER_SIZE`])
/// byte buffer that grows only when a single record does not fit it.
/// `flush` writes the buffer to the underlying file and advances `cursor`,
/// the writer's durable byte offset.
pub struct WalWriter {
    file: File,
    sync: bool,
    cursor: u64,
    buffer: Vec<u8>,
    pending: usize,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            cursor: 0,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            pending: 0,
        })
    }

    /// Current durable write offset: bytes actually flushed to the file.
    pub fn offset(&self) -> u64 {
        self.cursor
    }

    /// Sets the writer's logical cursor without touching the file, used
    /// after recovery has determined how much of the log is already durable.
    pub fn set_offset(&mut self, offset: u64) {
        self.cursor = offset;
    }

    /// Appends a Put/Delete record. Control ops are silently ignored.
    pub fn append(&mut self, key: &MVCCKey, value: &[u8]) -> Result<(), WalError> {
        if !matches!(key.op_type, OpType::Put | OpType::Delete) {
            return Ok(());
        }

        let frame = build_frame(key, value);
        self.make_room(frame.len())?;
        self.buffer[self.pending..self.pending + frame.len()].copy_from_slice(&frame);
        self.pending += frame.len();

        if self.sync {
            self.flush()?;
        }
        Ok(())
    }

    /// Ensures the buffer has room for `len` more bytes, flushing first and
    /// growing the buffer if the record itself exceeds capacity.
    fn make_room(&mut self, len: usize) -> Result<(), WalError> {
        if self.pending + len > self.buffer.len() {
            self.flush()?;
        }
        if len > self.buffer.len() {
            self.buffer.resize(len, 0);
        }
        Ok(())
    }

    /// Writes buffered bytes to the file and advances `cursor`.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.pending > 0 {
            self.file.write_all(&self.buffer[..self.pending])?;
            self.cursor += self.pending as u64;
            self.pending = 0;
        }
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

/// Sequential WAL reader.
///
/// Opened read-only and positioned explicitly with [`WalReader::seek`],
/// rather than sharing a writer's append-mode handle.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay, read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }

    /// Seeks to an absolute byte offset before replaying.
    pub fn seek(&mut self, offset: u64) -> Result<(), WalError> {
        self.rdr.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor (tests use an
    /// in-memory buffer).
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Reads and decodes the next record, or `None` at a clean end of log.
    ///
    /// A truncated tail record (fewer bytes remain than the frame declares,
    /// as left by a crash mid-append) is also reported as `None`, not an error.
    pub fn next_record(&mut self) -> Result<Option<(MVCCKey, Vec<u8>)>, WalError> {
        let mut crc_bytes = [0u8; 4];
        match self.rdr.read_exact(&mut crc_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        }
        let expected_crc = u32::from_le_bytes(crc_bytes);

        let mut len_bytes = [0u8; 3];
        match self.rdr.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        }
        let (header_len, _) = decode_varuint(&len_bytes)?;
        let header_len = header_len as usize;

        let mut header = vec![0u8; header_len];
        match self.rdr.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        }

        let (op_code, consumed) = decode_varuint(&header)?;
        let (key_len, consumed2) = decode_varuint(&header[consumed..])?;
        let (value_len, _) = decode_varuint(&header[consumed + consumed2..])?;

        let mut rest = vec![0u8; key_len as usize + value_len as usize];
        match self.rdr.read_exact(&mut rest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        }

        let mut hasher = Crc32::new();
        hasher.update(&len_bytes);
        hasher.update(&header);
        hasher.update(&rest);
        if hasher.finalize() != expected_crc {
            return Err(WalError::Corrupt);
        }

        let op_type = OpType::from_code(op_code as u8).ok_or(WalError::Corrupt)?;
        let key_bytes = &rest[..key_len as usize];
        let value = rest[key_len as usize..].to_vec();

        let mut key = MVCCKey::parse(key_bytes);
        key.op_type = op_type;
        Ok(Some((key, value)))
    }

    /// Replays every valid record, calling `apply(key, value)` for each one.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(MVCCKey, Vec<u8>),
    {
        while let Some((key, value)) = self.next_record()? {
            apply(key, value);
        }
        Ok(())
    }
}
