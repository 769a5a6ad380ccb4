//! Positioned-I/O block reads against an open SST file.
//!
//! The teacher's reader serializes every read behind a `Mutex<BufReader<File>>`.
//! SST files are never appended to after `DumpTable` finishes, so reads can
//! instead go straight through `FileExt::read_at` with no lock at all —
//! concurrent `get`/`range` calls no longer contend with each other. This
//! only holds because we're Linux-only; ported to a platform without
//! positioned reads, the mutex-guarded reader is the fallback.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

/// A byte range within an SST file.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    pub offset: u64,
    pub size: u64,
}

pub struct BlockReader<'a> {
    file: &'a File,
}

impl<'a> BlockReader<'a> {
    pub fn new(file: &'a File) -> Self {
        BlockReader { file }
    }

    /// Reads a single block.
    pub fn read(&self, block: &Block) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; block.size as usize];
        self.file.read_exact_at(&mut buf, block.offset)?;
        Ok(buf)
    }

    /// Reads several blocks belonging to the same table with one positioned
    /// I/O call spanning their combined range, then scatters the bytes back
    /// out per block. `blocks` must be sorted by ascending offset.
    pub fn read_many(&self, blocks: &[Block]) -> io::Result<Vec<Vec<u8>>> {
        if blocks.is_empty() {
            return Ok(Vec::new());
        }
        for pair in blocks.windows(2) {
            if pair[1].offset < pair[0].offset {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "blocks passed to read_many must be ordered by ascending offset",
                ));
            }
        }
        let min_offset = blocks[0].offset;
        let max_end = blocks
            .iter()
            .map(|b| b.offset + b.size)
            .max()
            .unwrap_or(min_offset);
        let mut span = vec![0u8; (max_end - min_offset) as usize];
        self.file.read_exact_at(&mut span, min_offset)?;

        let mut out = Vec::with_capacity(blocks.len());
        for block in blocks {
            let start = (block.offset - min_offset) as usize;
            let end = start + block.size as usize;
            out.push(span[start..end].to_vec());
        }
        Ok(out)
    }
}
