//! Byte-level JFFS2 dump builder shared by the integration tests
#![allow(dead_code)]

use jffs2_core::fs::jffs2::crc::jffs2_crc32;
use jffs2_core::Endianness;

pub const DT_REG: u8 = 8;
pub const DT_DIR: u8 = 4;

/// Field values for one data node
pub struct InodeSpec<'a> {
    pub ino: u32,
    pub version: u32,
    pub isize: u32,
    pub mtime: u32,
    pub foff: u32,
    pub dsize: u32,
    pub compr: u8,
    pub data: &'a [u8],
}

impl<'a> InodeSpec<'a> {
    /// Uncompressed write of `data` at `foff`, file size following the write
    pub fn plain(ino: u32, version: u32, foff: u32, data: &'a [u8]) -> Self {
        Self {
            ino,
            version,
            isize: foff + data.len() as u32,
            mtime: 1_000 + version,
            foff,
            dsize: data.len() as u32,
            compr: 0,
            data,
        }
    }
}

pub struct DumpBuilder {
    endianness: Endianness,
    bytes: Vec<u8>,
}

impl DumpBuilder {
    pub fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            bytes: Vec::new(),
        }
    }

    pub fn big() -> Self {
        Self::new(Endianness::Big)
    }

    pub fn little() -> Self {
        Self::new(Endianness::Little)
    }

    fn u16(&self, v: u16) -> [u8; 2] {
        match self.endianness {
            Endianness::Big => v.to_be_bytes(),
            Endianness::Little => v.to_le_bytes(),
        }
    }

    fn u32(&self, v: u32) -> [u8; 4] {
        match self.endianness {
            Endianness::Big => v.to_be_bytes(),
            Endianness::Little => v.to_le_bytes(),
        }
    }

    /// Current end of the dump
    pub fn offset(&self) -> usize {
        self.bytes.len()
    }

    /// Append a node with a valid header CRC and pad to 4 bytes
    pub fn node(mut self, node_type: u16, payload: &[u8]) -> Self {
        let mut header = Vec::with_capacity(12);
        header.extend_from_slice(&[0x19, 0x85]);
        header.extend_from_slice(&self.u16(node_type));
        header.extend_from_slice(&self.u32(12 + payload.len() as u32));
        let crc = jffs2_crc32(&header);
        header.extend_from_slice(&self.u32(crc));

        self.bytes.extend_from_slice(&header);
        self.bytes.extend_from_slice(payload);
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
        self
    }

    pub fn dirent(self, pino: u32, version: u32, ino: u32, name: &str, itype: u8) -> Self {
        let mut p = Vec::new();
        p.extend_from_slice(&self.u32(pino));
        p.extend_from_slice(&self.u32(version));
        p.extend_from_slice(&self.u32(ino));
        p.extend_from_slice(&self.u32(2_000 + version)); // mctime
        p.push(name.len() as u8);
        p.push(itype);
        p.extend_from_slice(&self.u16(0));
        p.extend_from_slice(&self.u32(0)); // node crc
        p.extend_from_slice(&self.u32(0)); // name crc
        p.extend_from_slice(name.as_bytes());
        self.node(0xE001, &p)
    }

    pub fn inode(self, spec: InodeSpec<'_>) -> Self {
        let mut p = Vec::new();
        p.extend_from_slice(&self.u32(spec.ino));
        p.extend_from_slice(&self.u32(spec.version));
        p.extend_from_slice(&self.u32(0o100644));
        p.extend_from_slice(&self.u16(0));
        p.extend_from_slice(&self.u16(0));
        p.extend_from_slice(&self.u32(spec.isize));
        p.extend_from_slice(&self.u32(spec.mtime)); // atime
        p.extend_from_slice(&self.u32(spec.mtime));
        p.extend_from_slice(&self.u32(spec.mtime)); // ctime
        p.extend_from_slice(&self.u32(spec.foff));
        p.extend_from_slice(&self.u32(spec.data.len() as u32)); // csize
        p.extend_from_slice(&self.u32(spec.dsize));
        p.push(spec.compr);
        p.push(0);
        p.extend_from_slice(&self.u16(0));
        p.extend_from_slice(&self.u32(0)); // data crc
        p.extend_from_slice(&self.u32(0)); // node crc
        p.extend_from_slice(spec.data);
        self.node(0xE002, &p)
    }

    pub fn cleanmarker(self) -> Self {
        self.node(0x2003, &[])
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn erased(mut self, len: usize) -> Self {
        self.bytes.resize(self.bytes.len() + len, 0xFF);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// One file "a.txt" in directory 1, written "hello" then "world"
pub fn hello_world_dump(endianness: Endianness) -> Vec<u8> {
    DumpBuilder::new(endianness)
        .dirent(1, 1, 2, "a.txt", DT_REG)
        .inode(InodeSpec::plain(2, 1, 0, b"hello"))
        .inode(InodeSpec::plain(2, 2, 0, b"world"))
        .build()
}
