//! The flat PAK archive container.
//!
//! A PAK file is a magic + version header, a run of per-entry headers
//! terminated by a sentinel flag byte, and then the concatenated entry
//! payloads — the whole thing optionally XOR-obfuscated with a single
//! repeating key byte (`0x00`, i.e. not obfuscated at all, or `0xF7`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::bitstream::BitStream;
use crate::diagnostics::Counter;
use crate::error::{Error, Result};

const PAK_MAGIC: u32 = 0xBAC0_4AC0;
const XOR_KEY: u8 = 0xF7;
const FLAG_END: u8 = 0x80;

/// Windows FILETIME ticks (100ns units) between 1601-01-01 and 1970-01-01.
const EPOCH_AS_FILETIME: u64 = 116_444_736_000_000_000;

/// Converts a raw FILETIME tick count to a UTC timestamp.
pub fn filetime_to_datetime(filetime: u64) -> DateTime<Utc> {
    let ticks = filetime as i64 - EPOCH_AS_FILETIME as i64;
    let nanos = ticks.saturating_mul(100);
    DateTime::from_timestamp(nanos / 1_000_000_000, (nanos.rem_euclid(1_000_000_000)) as u32)
        .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
}

/// Converts a UTC timestamp to a raw FILETIME tick count.
pub fn datetime_to_filetime(dt: DateTime<Utc>) -> u64 {
    let nanos = dt.timestamp_nanos_opt().unwrap_or(0);
    ((nanos / 100) + EPOCH_AS_FILETIME as i64).max(0) as u64
}

/// One stored file: its name (archive-relative, backslash-separated), raw
/// payload bytes, and last-write timestamp as a raw FILETIME tick count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub timestamp: u64,
}

/// An in-memory PAK archive: an ordered list of entries plus a name index.
#[derive(Debug, Clone, Default)]
pub struct PakArchive {
    entries: Vec<PakEntry>,
    index: HashMap<String, usize>,
    /// XOR key this archive was loaded with (0x00 or 0xF7); used again on
    /// save so round-tripping an untouched archive reproduces it byte for
    /// byte.
    pub xor_key: u8,
    /// Version field from the header, carried through unchanged on save.
    pub version: u32,
}

impl PakArchive {
    /// Creates an empty archive, unobfuscated by default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a PAK file or a directory tree as an archive, dispatching on
    /// whether `path` names a directory (mirrors the original loader, which
    /// picks `LoadFolder` vs `LoadPak` the same way).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_dir(path)
        } else {
            Self::load_pak(&fs::read(path)?)
        }
    }

    /// Parses PAK-formatted bytes already in memory.
    pub fn load_pak(bytes: &[u8]) -> Result<Self> {
        let mut bs = BitStream::from_vec(bytes.to_vec());
        let raw_magic = bs.peek_u32()?;
        let xor_key = if raw_magic == PAK_MAGIC {
            0x00
        } else if raw_magic ^ 0xF7F7_F7F7 == PAK_MAGIC {
            XOR_KEY
        } else {
            return Err(Error::NotAPak);
        };
        if xor_key != 0 {
            bs.transform(|b| b ^ xor_key);
        }
        let _magic = bs.read_u32()?;
        let version = bs.read_u32()?;
        if version != 0 {
            eprintln!("peggle_assets: pak version {version} (expected 0)");
        }

        struct Header {
            name: String,
            payload_size: u32,
            timestamp: u64,
        }
        let mut headers = Vec::new();
        loop {
            let flags = bs.read_u8()?;
            if flags & FLAG_END != 0 {
                break;
            }
            let name_len = bs.read_u8()? as usize;
            let name_bytes = bs.read_bytes(name_len)?;
            let name = String::from_utf8_lossy(&name_bytes).into_owned();
            let payload_size = bs.read_u32()?;
            let timestamp = bs.read_u64()?;
            headers.push(Header { name, payload_size, timestamp });
        }
        let header_size = bs.tell();

        let mut archive = Self::new();
        archive.xor_key = xor_key;
        archive.version = version;
        let mut pos: u64 = 0;
        for h in headers {
            bs.seek(header_size + pos as usize)?;
            let data = bs.read_bytes(h.payload_size as usize)?;
            pos += h.payload_size as u64;
            archive.add_raw(PakEntry { name: h.name, data, timestamp: h.timestamp })?;
        }
        Ok(archive)
    }

    /// Walks a directory tree into an archive, using each file's relative
    /// path (with `/` replaced by `\`, matching the original exporter) as
    /// its entry name and its last-modified time as the timestamp.
    pub fn load_dir(root: impl AsRef<Path>) -> Result<Self> {
        Self::load_dir_counted(root, &Counter::new())
    }

    /// Same as [`Self::load_dir`], but every skipped file also increments
    /// `counter`'s warning count, so a caller (the CLI) can report a final
    /// tally instead of relying solely on the `eprintln!` lines.
    pub fn load_dir_counted(root: impl AsRef<Path>, counter: &Counter) -> Result<Self> {
        let root = root.as_ref();
        let mut archive = Self::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if !path.is_file() {
                    continue;
                }
                let rel = path.strip_prefix(root).unwrap_or(&path);
                let name = rel.to_string_lossy().replace('/', "\\");
                if name.len() > 255 {
                    eprintln!("peggle_assets: skipping {name:?}: name longer than 255 bytes");
                    counter.inc_warning();
                    continue;
                }
                let data = fs::read(&path)?;
                if data.len() > u32::MAX as usize {
                    eprintln!("peggle_assets: skipping {name:?}: payload larger than u32::MAX");
                    counter.inc_warning();
                    continue;
                }
                let timestamp = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(|t| datetime_to_filetime(DateTime::<Utc>::from(t)))
                    .unwrap_or(EPOCH_AS_FILETIME);
                archive.add_raw(PakEntry { name, data, timestamp })?;
            }
        }
        Ok(archive)
    }

    fn add_raw(&mut self, entry: PakEntry) -> Result<()> {
        if self.index.contains_key(&entry.name) {
            return Err(Error::Conflict(entry.name));
        }
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Lists entries in archive order.
    pub fn list(&self) -> &[PakEntry] {
        &self.entries
    }

    /// True if an entry by this name exists.
    pub fn has_file(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Fetches an entry's payload by name.
    pub fn get_file(&self, name: &str) -> Result<&[u8]> {
        let &i = self.index.get(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
        Ok(&self.entries[i].data)
    }

    /// Adds a new entry. Errors if the name is already present, too long, or
    /// the payload is too large to store.
    pub fn add_file(&mut self, name: impl Into<String>, data: Vec<u8>, timestamp: u64) -> Result<()> {
        let name = name.into();
        if name.len() > 255 {
            return Err(Error::NameTooLong(name));
        }
        if data.len() > u32::MAX as usize {
            return Err(Error::PayloadTooLarge(name));
        }
        self.add_raw(PakEntry { name, data, timestamp })
    }

    /// Replaces an existing entry's payload and timestamp in place.
    pub fn update_file(&mut self, name: &str, data: Vec<u8>, timestamp: u64) -> Result<()> {
        let &i = self.index.get(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
        if data.len() > u32::MAX as usize {
            return Err(Error::PayloadTooLarge(name.to_string()));
        }
        self.entries[i].data = data;
        self.entries[i].timestamp = timestamp;
        Ok(())
    }

    /// Removes an entry by name.
    pub fn remove_file(&mut self, name: &str) -> Result<()> {
        let i = self.index.remove(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.entries.remove(i);
        for idx in self.index.values_mut() {
            if *idx > i {
                *idx -= 1;
            }
        }
        Ok(())
    }

    /// Serializes the archive to PAK bytes, applying `self.xor_key`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bs = BitStream::new();
        bs.write_u32(PAK_MAGIC);
        bs.write_u32(self.version);
        for entry in &self.entries {
            if entry.name.len() > 255 {
                return Err(Error::NameTooLong(entry.name.clone()));
            }
            bs.write_u8(0x00);
            bs.write_u8(entry.name.len() as u8);
            bs.write_bytes(entry.name.as_bytes());
            bs.write_u32(entry.data.len() as u32);
            bs.write_u64(entry.timestamp);
        }
        bs.write_u8(FLAG_END);
        for entry in &self.entries {
            bs.write_bytes(&entry.data);
        }
        if self.xor_key != 0 {
            bs.transform(|b| b ^ self.xor_key);
        }
        Ok(bs.into_vec())
    }

    /// Writes the archive to a PAK file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Exports every entry to `root`, recreating its relative directory
    /// structure, and stamps each file's modified time from its timestamp.
    pub fn export(&self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        for entry in &self.entries {
            let rel: PathBuf = entry.name.replace('\\', "/").into();
            let out = root.join(rel);
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&out, &entry.data)?;
            let ft = filetime_to_datetime(entry.timestamp);
            let system_time: std::time::SystemTime = ft.into();
            fs::File::open(&out)?.set_modified(system_time)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_unobfuscated() {
        let mut archive = PakArchive::new();
        archive.add_file("levels\\level1.dat", vec![1, 2, 3, 4], 0).unwrap();
        archive.add_file("stages.cfg", b"Stage {}".to_vec(), 123).unwrap();
        let bytes = archive.to_bytes().unwrap();
        let reloaded = PakArchive::load_pak(&bytes).unwrap();
        assert_eq!(reloaded.list().len(), 2);
        assert_eq!(reloaded.get_file("stages.cfg").unwrap(), b"Stage {}");
    }

    #[test]
    fn roundtrip_xor_obfuscated() {
        let mut archive = PakArchive::new();
        archive.xor_key = 0xF7;
        archive.add_file("a.txt", vec![9, 9, 9], 0).unwrap();
        let bytes = archive.to_bytes().unwrap();
        assert_ne!(&bytes[0..4], &PAK_MAGIC.to_le_bytes());
        let reloaded = PakArchive::load_pak(&bytes).unwrap();
        assert_eq!(reloaded.xor_key, 0xF7);
        assert_eq!(reloaded.get_file("a.txt").unwrap(), &[9, 9, 9]);
    }

    #[test]
    fn nonzero_version_round_trips() {
        let mut archive = PakArchive::new();
        archive.version = 3;
        archive.add_file("a.txt", vec![1], 0).unwrap();
        let bytes = archive.to_bytes().unwrap();
        let reloaded = PakArchive::load_pak(&bytes).unwrap();
        assert_eq!(reloaded.version, 3);
    }

    #[test]
    fn bad_magic_errors() {
        let err = PakArchive::load_pak(&[0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::NotAPak));
    }

    #[test]
    fn duplicate_name_conflicts() {
        let mut archive = PakArchive::new();
        archive.add_file("a", vec![], 0).unwrap();
        assert!(matches!(archive.add_file("a", vec![], 0), Err(Error::Conflict(_))));
    }

    #[test]
    fn missing_entry_not_found() {
        let archive = PakArchive::new();
        assert!(matches!(archive.get_file("nope"), Err(Error::NotFound(_))));
    }
}
