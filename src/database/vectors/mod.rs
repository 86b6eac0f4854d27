//! Binary-packed vector storage, one file per index.
//!
//! # Format
//!
//! - Header (16 bytes): magic, format version, dimension, published count
//! - Records: `ordinal: u32` + `dimension × f32`, little-endian
//!
//! Storage cost is 4 bytes per dimension per vector plus 4 bytes per record
//! for the ordinal. Appends are two-phase: record bytes are written first,
//! the header count last. Scans never read past the published count, so a
//! reader sees the state before or after an append call, never a torn
//! prefix. Reads go through a memory map and a single reusable row buffer;
//! the full vector set is never materialised.


use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use thiserror::Error;

use crate::vecmath::DimensionMismatch;

const MAGIC_BYTES: &[u8; 4] = b"SVEC";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 16;
const COUNT_OFFSET: u64 = 12;
const BYTES_PER_F32: usize = 4;
const BYTES_PER_ORDINAL: usize = 4;

#[derive(Error, Debug)]
pub enum VectorFileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid vector file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported vector file version {actual} (expected {expected})")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error(transparent)]
    Dimension(#[from] DimensionMismatch),
}

/// Append-only vector file for a single index.
#[derive(Debug)]
pub struct VectorFile {
    path: PathBuf,
    mmap: Option<Mmap>,
    dimension: usize,
    /// Number of records visible to readers.
    published: usize,
    /// Records written but not yet published to the header.
    pending: usize,
}

impl VectorFile {
    /// File name for the given index id under `base_dir`.
    #[inline]
    pub fn path_for(base_dir: &Path, index_id: i64) -> PathBuf {
        base_dir.join(format!("index_{index_id}.vec"))
    }

    /// Open an existing file, validating the header.
    #[inline]
    pub fn open(base_dir: &Path, index_id: i64) -> Result<Self, VectorFileError> {
        let path = Self::path_for(base_dir, index_id);
        if !path.exists() {
            return Err(VectorFileError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("vector file not found: {}", path.display()),
            )));
        }

        let file = File::open(&path)?;
        // SAFETY: the mapping is read-only and the file is append-only; the
        // region below the published count is never rewritten.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let (dimension, published) = read_header(&mmap)?;

        Ok(Self {
            path,
            mmap: Some(mmap),
            dimension,
            published,
            pending: 0,
        })
    }

    /// Open the file for this index, creating it with the given dimension
    /// if it does not exist yet.
    #[inline]
    pub fn open_or_create(
        base_dir: &Path,
        index_id: i64,
        dimension: usize,
    ) -> Result<Self, VectorFileError> {
        let path = Self::path_for(base_dir, index_id);
        if path.exists() {
            let file = Self::open(base_dir, index_id)?;
            if file.dimension != dimension {
                return Err(DimensionMismatch {
                    expected: dimension,
                    actual: file.dimension,
                }
                .into());
            }
            return Ok(file);
        }

        std::fs::create_dir_all(base_dir)?;
        let mut file = File::create(&path)?;
        write_header(&mut file, dimension, 0)?;
        file.flush()?;

        Ok(Self {
            path,
            mmap: None,
            dimension,
            published: 0,
            pending: 0,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Records visible to readers.
    #[inline]
    pub fn count(&self) -> usize {
        self.published
    }

    /// Write records without publishing them. Readers keep seeing the old
    /// count until [`publish`](Self::publish) runs.
    #[inline]
    pub fn append_records(
        &mut self,
        vectors: &[(u32, &[f32])],
    ) -> Result<(), VectorFileError> {
        for (_, vector) in vectors {
            if vector.len() != self.dimension {
                return Err(DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                }
                .into());
            }
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let mut buffer =
            Vec::with_capacity(vectors.len() * (BYTES_PER_ORDINAL + self.dimension * BYTES_PER_F32));
        for (ordinal, vector) in vectors {
            buffer.extend_from_slice(&ordinal.to_le_bytes());
            for value in *vector {
                buffer.extend_from_slice(&value.to_le_bytes());
            }
        }
        file.write_all(&buffer)?;
        file.flush()?;

        self.pending += vectors.len();
        Ok(())
    }

    /// Make previously appended records visible to readers.
    #[inline]
    pub fn publish(&mut self) -> Result<(), VectorFileError> {
        if self.pending == 0 {
            return Ok(());
        }
        self.published += self.pending;
        self.pending = 0;

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&(self.published as u32).to_le_bytes())?;
        file.flush()?;

        // Force a remap so subsequent reads see the new records.
        self.mmap = None;
        Ok(())
    }

    /// Append and publish in one step.
    #[inline]
    pub fn append_batch(&mut self, vectors: &[(u32, &[f32])]) -> Result<(), VectorFileError> {
        self.append_records(vectors)?;
        self.publish()
    }

    /// Read one vector by ordinal, scanning published records.
    #[inline]
    pub fn read_vector(&mut self, ordinal: u32) -> Result<Option<Vec<f32>>, VectorFileError> {
        let mut result = None;
        self.for_each(|record_ordinal, values| {
            if record_ordinal == ordinal && result.is_none() {
                result = Some(values.to_vec());
            }
        })?;
        Ok(result)
    }

    /// Visit every published record in file order.
    ///
    /// Record values are decoded into one reusable row buffer, so memory use
    /// is a single vector regardless of how many records the file holds.
    #[inline]
    pub fn for_each(
        &mut self,
        mut visit: impl FnMut(u32, &[f32]),
    ) -> Result<(), VectorFileError> {
        if self.published == 0 {
            return Ok(());
        }
        self.ensure_mapped()?;
        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| VectorFileError::InvalidFormat("mapping failed".to_string()))?;

        let record_size = BYTES_PER_ORDINAL + self.dimension * BYTES_PER_F32;
        let mut row = vec![0.0f32; self.dimension];

        for index in 0..self.published {
            let offset = HEADER_SIZE + index * record_size;
            if offset + record_size > mmap.len() {
                // Published count points past the file; the consistency
                // validator repairs this.
                break;
            }
            let ordinal = u32::from_le_bytes([
                mmap[offset],
                mmap[offset + 1],
                mmap[offset + 2],
                mmap[offset + 3],
            ]);
            let data_offset = offset + BYTES_PER_ORDINAL;
            for (i, slot) in row.iter_mut().enumerate() {
                let at = data_offset + i * BYTES_PER_F32;
                *slot = f32::from_le_bytes([mmap[at], mmap[at + 1], mmap[at + 2], mmap[at + 3]]);
            }
            visit(ordinal, &row);
        }
        Ok(())
    }

    /// Records actually present in the file, published or not.
    #[inline]
    pub fn records_on_disk(&self) -> Result<usize, VectorFileError> {
        let len = std::fs::metadata(&self.path)?.len() as usize;
        let record_size = BYTES_PER_ORDINAL + self.dimension * BYTES_PER_F32;
        Ok(len.saturating_sub(HEADER_SIZE) / record_size)
    }

    /// Drop unpublished record bytes from the end of the file.
    #[inline]
    pub fn truncate_to_published(&mut self) -> Result<usize, VectorFileError> {
        let on_disk = self.records_on_disk()?;
        let excess = on_disk.saturating_sub(self.published);
        if excess > 0 {
            let record_size = BYTES_PER_ORDINAL + self.dimension * BYTES_PER_F32;
            let keep = (HEADER_SIZE + self.published * record_size) as u64;
            let file = OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(keep)?;
            self.mmap = None;
            self.pending = 0;
        }
        Ok(excess)
    }

    /// Remove the file for an index, if present.
    #[inline]
    pub fn delete(base_dir: &Path, index_id: i64) -> Result<(), VectorFileError> {
        let path = Self::path_for(base_dir, index_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    #[inline]
    pub fn exists(base_dir: &Path, index_id: i64) -> bool {
        Self::path_for(base_dir, index_id).exists()
    }

    fn ensure_mapped(&mut self) -> Result<(), VectorFileError> {
        if self.mmap.is_none() {
            let file = File::open(&self.path)?;
            // SAFETY: read-only mapping of an append-only file; see `open`.
            let mmap = unsafe { MmapOptions::new().map(&file)? };
            let (dimension, published) = read_header(&mmap)?;
            if dimension != self.dimension {
                return Err(DimensionMismatch {
                    expected: self.dimension,
                    actual: dimension,
                }
                .into());
            }
            self.published = published;
            self.mmap = Some(mmap);
        }
        Ok(())
    }
}

fn write_header(file: &mut File, dimension: usize, count: u32) -> Result<(), io::Error> {
    file.write_all(MAGIC_BYTES)?;
    file.write_all(&FORMAT_VERSION.to_le_bytes())?;
    file.write_all(&(dimension as u32).to_le_bytes())?;
    file.write_all(&count.to_le_bytes())?;
    Ok(())
}

fn read_header(mmap: &Mmap) -> Result<(usize, usize), VectorFileError> {
    if mmap.len() < HEADER_SIZE {
        return Err(VectorFileError::InvalidFormat(
            "file too small to contain header".to_string(),
        ));
    }
    if &mmap[0..4] != MAGIC_BYTES {
        return Err(VectorFileError::InvalidFormat(
            "invalid magic bytes".to_string(),
        ));
    }
    let version = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]);
    if version != FORMAT_VERSION {
        return Err(VectorFileError::VersionMismatch {
            expected: FORMAT_VERSION,
            actual: version,
        });
    }
    let dimension = u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]) as usize;
    if dimension == 0 {
        return Err(VectorFileError::InvalidFormat(
            "zero dimension in header".to_string(),
        ));
    }
    let count = u32::from_le_bytes([mmap[12], mmap[13], mmap[14], mmap[15]]) as usize;
    Ok((dimension, count))
}
