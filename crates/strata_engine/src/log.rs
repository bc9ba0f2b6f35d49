//! Persistent log-structured engine.
//!
//! On-disk layout:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK          # Advisory lock for single-process access
//! └─ strata.log    # Append-only record log
//! ```
//!
//! Every write batch is appended as one framed record, so a batch is
//! all-or-nothing on disk: a torn final frame is discarded on recovery.
//! Keys index into the log; values are read back from disk on demand and
//! can be checksum-verified per read. When recovery finds that most
//! records are dead (overwritten or deleted), the log is rewritten with
//! live entries only.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::batch::{Batch, BatchOp};
use crate::config::{Config, ReadOptions, WriteOptions};
use crate::engine::{Engine, EngineHandle};
use crate::error::{EngineError, EngineResult};

/// File names within the database directory.
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "strata.log";
/// Temporary file for atomic log rewrites.
const LOG_TEMP: &str = "strata.log.tmp";

/// Frame header size: CRC32 + body length.
const FRAME_HEADER: u64 = 8;

/// Record kind tags within a frame body.
const KIND_PUT: u8 = 1;
const KIND_DELETE: u8 = 2;

/// Minimum number of dead records before recovery rewrites the log.
const COMPACT_MIN_DEAD: usize = 256;

/// A persistent log-structured engine.
///
/// Not an LSM tree: the whole store is one append-only log replayed into
/// an ordered index on open. That keeps the engine honest about disk I/O,
/// durability, locking, and corruption without carrying compaction
/// machinery this crate does not need.
///
/// The `cache_size` and `compression` options are accepted and currently
/// ignored; values are stored raw and reads always go to the file.
#[derive(Debug, Default)]
pub struct LogEngine;

impl LogEngine {
    /// Creates a new log engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Engine for LogEngine {
    fn open(&self, path: &Path, config: &Config) -> EngineResult<Box<dyn EngineHandle>> {
        let handle = LogHandle::open(path, config)?;
        Ok(Box::new(handle))
    }

    fn destroy(&self, path: &Path) -> EngineResult<()> {
        if !path.exists() {
            return Ok(());
        }

        // Refuse to wipe a database another process has open.
        let lock_path = path.join(LOCK_FILE);
        if lock_path.exists() {
            let lock_file = OpenOptions::new().read(true).write(true).open(&lock_path)?;
            if lock_file.try_lock_exclusive().is_err() {
                return Err(EngineError::Locked);
            }
        }

        fs::remove_dir_all(path)?;
        debug!(path = %path.display(), "destroyed database");
        Ok(())
    }
}

/// Location of one live value inside the log file.
#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Offset of the frame header.
    frame_offset: u64,
    /// Length of the frame body.
    body_len: u32,
    /// CRC32 of the frame body, as stored in the header.
    crc: u32,
    /// Absolute offset of the value bytes.
    value_offset: u64,
    /// Length of the value bytes.
    value_len: u32,
}

/// The log file plus its current end offset.
#[derive(Debug)]
struct LogFile {
    file: File,
    end: u64,
}

/// An open log-structured database.
#[derive(Debug)]
pub struct LogHandle {
    path: PathBuf,
    log: Mutex<LogFile>,
    index: RwLock<BTreeMap<Vec<u8>, Slot>>,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl LogHandle {
    fn open(path: &Path, config: &Config) -> EngineResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(EngineError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("database directory does not exist: {}", path.display()),
                )));
            }
        }

        if !path.is_dir() {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        // Acquire exclusive lock (non-blocking).
        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked);
        }

        let log_path = path.join(LOG_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&log_path)?;

        let (index, records, valid_len) = replay(&mut file)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            // Torn final frame from an interrupted write; drop it whole.
            debug!(
                dropped = file_len - valid_len,
                "truncating torn log tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let mut handle = Self {
            path: path.to_path_buf(),
            log: Mutex::new(LogFile {
                file,
                end: valid_len,
            }),
            index: RwLock::new(index),
            _lock_file: lock_file,
        };

        let live = handle.index.read().len();
        let dead = records.saturating_sub(live);
        if dead >= COMPACT_MIN_DEAD && dead > live {
            debug!(live, dead, "rewriting log");
            handle.rewrite()?;
        }

        debug!(path = %path.display(), entries = live, "opened database");
        Ok(handle)
    }

    /// Rewrites the log with live entries only, atomically.
    ///
    /// Uses the write-then-rename pattern: the compacted log is written to
    /// a temporary file, synced, and renamed over the old log, then the
    /// directory is fsynced so the rename is durable.
    fn rewrite(&mut self) -> EngineResult<()> {
        let temp_path = self.path.join(LOG_TEMP);
        let log_path = self.path.join(LOG_FILE);

        let mut temp = File::create(&temp_path)?;
        let mut new_index = BTreeMap::new();
        let mut end = 0u64;

        {
            let old_index = self.index.read();
            let mut log = self.log.lock();
            for (key, slot) in old_index.iter() {
                let value = read_value(&mut log.file, slot)?;
                let batch = Batch::single_put(key.clone(), value);
                let (frame, slots) = encode_frame(&batch);
                temp.write_all(&frame)?;
                for (entry_key, rel) in slots {
                    if let Some(rel) = rel {
                        new_index.insert(entry_key, rel.at(end));
                    }
                }
                end += frame.len() as u64;
            }
        }

        temp.sync_all()?;
        drop(temp);
        fs::rename(&temp_path, &log_path)?;
        sync_directory(&self.path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&log_path)?;
        *self.log.lock() = LogFile { file, end };
        *self.index.write() = new_index;
        Ok(())
    }
}

impl EngineHandle for LogHandle {
    fn get(&self, key: &[u8], options: &ReadOptions) -> EngineResult<Vec<u8>> {
        let slot = *self.index.read().get(key).ok_or(EngineError::NotFound)?;

        let mut log = self.log.lock();
        if options.verify_checksums {
            let mut body = vec![0u8; slot.body_len as usize];
            log.file.seek(SeekFrom::Start(slot.frame_offset + FRAME_HEADER))?;
            log.file.read_exact(&mut body)?;
            let actual = compute_crc32(&body);
            if actual != slot.crc {
                return Err(EngineError::corruption(format!(
                    "checksum mismatch at offset {}: expected {:08x}, got {:08x}",
                    slot.frame_offset, slot.crc, actual
                )));
            }
            let start = (slot.value_offset - slot.frame_offset - FRAME_HEADER) as usize;
            Ok(body[start..start + slot.value_len as usize].to_vec())
        } else {
            read_value(&mut log.file, &slot)
        }
    }

    fn write(&self, batch: &Batch, options: &WriteOptions) -> EngineResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let (frame, slots) = encode_frame(batch);

        let mut log = self.log.lock();
        let frame_offset = log.end;
        log.file.seek(SeekFrom::Start(frame_offset))?;
        log.file.write_all(&frame)?;
        if options.sync {
            log.file.sync_data()?;
        }
        log.end += frame.len() as u64;

        // Apply all index updates under one write lock so no reader
        // observes a partial batch.
        let mut index = self.index.write();
        for (key, rel) in slots {
            match rel {
                Some(rel) => {
                    index.insert(key, rel.at(frame_offset));
                }
                None => {
                    index.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            "strata.engine" => Some("log".to_string()),
            "strata.num-entries" => Some(self.index.read().len().to_string()),
            "strata.log-bytes" => Some(self.log.lock().end.to_string()),
            _ => None,
        }
    }

    fn close(&self) -> EngineResult<()> {
        let log = self.log.lock();
        log.file.sync_all()?;
        debug!(path = %self.path.display(), "closed database");
        Ok(())
    }
}

/// A slot relative to its frame's start, produced during encoding.
#[derive(Debug, Clone, Copy)]
struct RelSlot {
    body_len: u32,
    crc: u32,
    /// Value offset relative to the frame start.
    value_rel: u64,
    value_len: u32,
}

impl RelSlot {
    /// Anchors the slot at an absolute frame offset.
    fn at(self, frame_offset: u64) -> Slot {
        Slot {
            frame_offset,
            body_len: self.body_len,
            crc: self.crc,
            value_offset: frame_offset + self.value_rel,
            value_len: self.value_len,
        }
    }
}

/// Serializes a batch into one framed record.
///
/// Returns the frame bytes plus, per entry in order, the key and the
/// relative slot of its value (`None` for deletes).
fn encode_frame(batch: &Batch) -> (Vec<u8>, Vec<(Vec<u8>, Option<RelSlot>)>) {
    let mut body = Vec::new();
    let mut slots = Vec::with_capacity(batch.len());

    body.extend_from_slice(&(batch.len() as u32).to_le_bytes());
    for op in batch.ops() {
        match op {
            BatchOp::Put { key, value } => {
                body.push(KIND_PUT);
                body.extend_from_slice(&(key.len() as u32).to_le_bytes());
                body.extend_from_slice(key);
                body.extend_from_slice(&(value.len() as u32).to_le_bytes());
                let value_rel = FRAME_HEADER + body.len() as u64;
                body.extend_from_slice(value);
                slots.push((
                    key.clone(),
                    Some(RelSlot {
                        body_len: 0, // patched below
                        crc: 0,      // patched below
                        value_rel,
                        value_len: value.len() as u32,
                    }),
                ));
            }
            BatchOp::Delete { key } => {
                body.push(KIND_DELETE);
                body.extend_from_slice(&(key.len() as u32).to_le_bytes());
                body.extend_from_slice(key);
                body.extend_from_slice(&0u32.to_le_bytes());
                slots.push((key.clone(), None));
            }
        }
    }

    let crc = compute_crc32(&body);
    let body_len = body.len() as u32;
    for (_, slot) in slots.iter_mut() {
        if let Some(slot) = slot {
            slot.crc = crc;
            slot.body_len = body_len;
        }
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER as usize + body.len());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&body_len.to_le_bytes());
    frame.extend_from_slice(&body);
    (frame, slots)
}

/// Reads a value back from the log without checksum verification.
fn read_value(file: &mut File, slot: &Slot) -> EngineResult<Vec<u8>> {
    let mut value = vec![0u8; slot.value_len as usize];
    file.seek(SeekFrom::Start(slot.value_offset))?;
    file.read_exact(&mut value)?;
    Ok(value)
}

/// Replays the log into an index.
///
/// Returns the index, the total number of records replayed, and the
/// offset of the first byte past the last complete frame. Structural
/// damage inside a complete frame is corruption; an incomplete frame at
/// the tail is a torn write and is simply not replayed.
fn replay(file: &mut File) -> EngineResult<(BTreeMap<Vec<u8>, Slot>, usize, u64)> {
    let file_len = file.metadata()?.len();
    let mut data = Vec::with_capacity(file_len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut data)?;

    let mut index = BTreeMap::new();
    let mut records = 0usize;
    let mut offset = 0usize;

    while offset < data.len() {
        if data.len() - offset < FRAME_HEADER as usize {
            break; // torn header
        }
        let crc = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap_or_default());
        let body_len =
            u32::from_le_bytes(data[offset + 4..offset + 8].try_into().unwrap_or_default())
                as usize;
        let body_start = offset + FRAME_HEADER as usize;
        if data.len() - body_start < body_len {
            break; // torn body
        }
        let body = &data[body_start..body_start + body_len];
        let frame_offset = offset as u64;

        records += replay_frame(body, crc, body_len as u32, frame_offset, &mut index)?;
        offset = body_start + body_len;
    }

    Ok((index, records, offset as u64))
}

/// Parses one frame body and applies its entries to the index.
fn replay_frame(
    body: &[u8],
    crc: u32,
    body_len: u32,
    frame_offset: u64,
    index: &mut BTreeMap<Vec<u8>, Slot>,
) -> EngineResult<usize> {
    let corrupt = |message: &str| {
        EngineError::corruption(format!("{message} in frame at offset {frame_offset}"))
    };

    let mut cursor = 0usize;
    let read_u32 = |cursor: &mut usize| -> EngineResult<u32> {
        if *cursor + 4 > body.len() {
            return Err(corrupt("unexpected end of body"));
        }
        let bytes: [u8; 4] = body[*cursor..*cursor + 4]
            .try_into()
            .map_err(|_| corrupt("invalid u32"))?;
        *cursor += 4;
        Ok(u32::from_le_bytes(bytes))
    };

    let count = read_u32(&mut cursor)? as usize;
    for _ in 0..count {
        if cursor >= body.len() {
            return Err(corrupt("unexpected end of body"));
        }
        let kind = body[cursor];
        cursor += 1;

        let key_len = read_u32(&mut cursor)? as usize;
        if cursor + key_len > body.len() {
            return Err(corrupt("key extends past body"));
        }
        let key = body[cursor..cursor + key_len].to_vec();
        cursor += key_len;

        let value_len = read_u32(&mut cursor)? as usize;
        if cursor + value_len > body.len() {
            return Err(corrupt("value extends past body"));
        }

        match kind {
            KIND_PUT => {
                let value_offset = frame_offset + FRAME_HEADER + cursor as u64;
                index.insert(
                    key,
                    Slot {
                        frame_offset,
                        body_len,
                        crc,
                        value_offset,
                        value_len: value_len as u32,
                    },
                );
            }
            KIND_DELETE => {
                if value_len != 0 {
                    return Err(corrupt("delete record carries a value"));
                }
                index.remove(&key);
            }
            _ => return Err(corrupt("unknown record kind")),
        }
        cursor += value_len;
    }

    if cursor != body.len() {
        return Err(corrupt("trailing bytes"));
    }
    Ok(count)
}

/// Syncs the database directory so metadata updates are durable.
///
/// On Windows the NTFS journal covers metadata durability, so the
/// explicit fsync is skipped.
#[cfg(unix)]
fn sync_directory(path: &Path) -> EngineResult<()> {
    let dir = File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> EngineResult<()> {
    Ok(())
}

/// Computes CRC32 checksum for data.
fn compute_crc32(data: &[u8]) -> u32 {
    // Simple CRC32 implementation (IEEE polynomial)
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
