/// Common types for reading raw flash dumps
use anyhow::{Context, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use memmap2::MmapOptions;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Cursor};
use std::path::Path;

use crate::error::Jffs2Error;

/// Byte order of every multi-byte field in the dump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// A memory-mapped flash dump
pub struct DumpImage {
    _file: File,
    mmap: memmap2::Mmap,
    size: u64,
}

impl DumpImage {
    /// Open a dump file read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening dump {}", path.display()))?;
        let size = file.metadata()?.len();

        // Zero-length mappings are rejected on some platforms
        if size == 0 {
            return Err(Jffs2Error::EmptyImage)
                .with_context(|| format!("reading dump {}", path.display()));
        }

        let mmap = unsafe { MmapOptions::new().map(&file)? };

        Ok(DumpImage {
            _file: file,
            mmap,
            size,
        })
    }

    /// Size of the dump in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The whole dump
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

/// Sequential reader of fixed-width fields in a chosen byte order
pub struct FieldReader<'a> {
    cursor: Cursor<&'a [u8]>,
    endianness: Endianness,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8], endianness: Endianness) -> Self {
        Self {
            cursor: Cursor::new(data),
            endianness,
        }
    }

    pub fn u8(&mut self) -> io::Result<u8> {
        self.cursor.read_u8()
    }

    pub fn u16(&mut self) -> io::Result<u16> {
        match self.endianness {
            Endianness::Big => self.cursor.read_u16::<BigEndian>(),
            Endianness::Little => self.cursor.read_u16::<LittleEndian>(),
        }
    }

    pub fn u32(&mut self) -> io::Result<u32> {
        match self.endianness {
            Endianness::Big => self.cursor.read_u32::<BigEndian>(),
            Endianness::Little => self.cursor.read_u32::<LittleEndian>(),
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> &'a [u8] {
        let data: &'a [u8] = *self.cursor.get_ref();
        &data[self.position().min(data.len())..]
    }
}
