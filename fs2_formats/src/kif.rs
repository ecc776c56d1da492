use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::MmapOptions;
use serde::Serialize;

use crate::error::FormatError;

/// One `.int` container referenced by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub filename: String,
    pub entry_count: u32,
    pub encrypted: bool,
    pub key: [u8; 4],
}

/// Where an asset lives inside its archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetLocation {
    pub archive: u8,
    pub offset: u64,
    pub length: u64,
}

impl AssetLocation {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Parsed `kif.fs2` manifest: archive table plus the flattened asset index.
///
/// Asset names are stored lower-cased; lookups go through [`normalize_name`]
/// so the catalog is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct KifManifest {
    path: Option<PathBuf>,
    archives: Vec<ArchiveEntry>,
    entries: BTreeMap<String, AssetLocation>,
}

pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl KifManifest {
    pub fn new(archives: Vec<ArchiveEntry>) -> Self {
        KifManifest {
            path: None,
            archives,
            entries: BTreeMap::new(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening KIF manifest at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping KIF manifest {}", path_buf.display()))?;

        let mut manifest = KifManifest::parse(&mmap)
            .with_context(|| format!("parsing KIF manifest {}", path_buf.display()))?;
        manifest.path = Some(path_buf);
        Ok(manifest)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut cursor = Cursor::new(bytes);
        let mut archives = Vec::new();

        loop {
            let filename = read_c_string(&mut cursor, "archive table")?;
            if filename.is_empty() {
                break;
            }
            let entry_count = cursor.read_u32::<LittleEndian>()?;
            let encrypted = cursor.read_u8()? != 0;
            let mut key = [0u8; 4];
            if encrypted {
                cursor.read_exact(&mut key)?;
            }
            archives.push(ArchiveEntry {
                filename,
                entry_count,
                encrypted,
                key,
            });
        }

        let mut manifest = KifManifest::new(archives);
        let total = bytes.len() as u64;
        while cursor.position() < total {
            let name = read_c_string(&mut cursor, "asset table")?;
            let offset = cursor.read_u32::<LittleEndian>()? as u64;
            let length = cursor.read_u32::<LittleEndian>()? as u64;
            let archive = cursor.read_u8()?;

            if name.is_empty() {
                return Err(FormatError::layout(format!(
                    "empty asset name before byte {}",
                    cursor.position()
                )));
            }
            if archive as usize >= manifest.archives.len() {
                return Err(FormatError::layout(format!(
                    "asset '{name}' references archive {archive} but only {} are listed",
                    manifest.archives.len()
                )));
            }

            manifest.insert(
                &name,
                AssetLocation {
                    archive,
                    offset,
                    length,
                },
            );
        }

        Ok(manifest)
    }

    /// Adds an asset unless one with the same (case-folded) name is already
    /// indexed. Returns whether the entry was inserted.
    pub fn insert(&mut self, name: &str, location: AssetLocation) -> bool {
        let key = normalize_name(name);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, location);
        true
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn archives(&self) -> &[ArchiveEntry] {
        &self.archives
    }

    pub fn archive(&self, index: u8) -> Option<&ArchiveEntry> {
        self.archives.get(index as usize)
    }

    pub fn find_entry(&self, name: &str) -> Option<&AssetLocation> {
        self.entries.get(&normalize_name(name))
    }

    pub fn entries(&self) -> impl ExactSizeIterator<Item = (&str, &AssetLocation)> {
        self.entries
            .iter()
            .map(|(name, location)| (name.as_str(), location))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the manifest back into the `kif.fs2` layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for archive in &self.archives {
            out.extend_from_slice(archive.filename.as_bytes());
            out.push(0);
            // Writing into a Vec cannot fail.
            let _ = out.write_u32::<LittleEndian>(archive.entry_count);
            out.push(u8::from(archive.encrypted));
            if archive.encrypted {
                out.extend_from_slice(&archive.key);
            }
        }
        out.push(0);

        for (name, location) in &self.entries {
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            let _ = out.write_u32::<LittleEndian>(location.offset as u32);
            let _ = out.write_u32::<LittleEndian>(location.length as u32);
            out.push(location.archive);
        }
        out
    }
}

fn read_c_string(cursor: &mut Cursor<&[u8]>, what: &'static str) -> Result<String, FormatError> {
    let data = *cursor.get_ref();
    let start = cursor.position() as usize;
    let Some(len) = data[start.min(data.len())..].iter().position(|&b| b == 0) else {
        return Err(FormatError::truncated(what, start + 1, data.len()));
    };
    cursor.set_position((start + len + 1) as u64);
    Ok(String::from_utf8_lossy(&data[start..start + len]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        // archive table: "bgm.int" (plain), "image.int" (encrypted), terminator
        data.extend_from_slice(b"bgm.int\0");
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(0);
        data.extend_from_slice(b"image.int\0");
        data.extend_from_slice(&2u32.to_le_bytes());
        data.push(1);
        data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        data.push(0);
        // assets
        data.extend_from_slice(b"BG01.ogg\0");
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&50u32.to_le_bytes());
        data.push(0);
        data.extend_from_slice(b"cg01_1.hg3\0");
        data.extend_from_slice(&4096u32.to_le_bytes());
        data.extend_from_slice(&12u32.to_le_bytes());
        data.push(1);
        data
    }

    #[test]
    fn parses_archive_table_and_assets() {
        let manifest = KifManifest::parse(&sample_bytes()).unwrap();
        assert_eq!(manifest.archives().len(), 2);
        assert!(!manifest.archives()[0].encrypted);
        assert_eq!(manifest.archives()[1].filename, "image.int");
        assert!(manifest.archives()[1].encrypted);
        assert_eq!(manifest.archives()[1].key, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(manifest.len(), 2);

        let location = manifest.find_entry("bg01.OGG").unwrap();
        assert_eq!(location.archive, 0);
        assert_eq!(location.offset, 100);
        assert_eq!(location.length, 50);
        assert_eq!(location.end(), 150);
    }

    #[test]
    fn rejects_unknown_archive_index() {
        let mut data = sample_bytes();
        let last = data.len() - 1;
        data[last] = 9;
        let err = KifManifest::parse(&data).unwrap_err();
        assert!(matches!(err, FormatError::TableLayout(_)), "{err}");
    }

    #[test]
    fn rejects_truncated_entry() {
        let mut data = sample_bytes();
        data.truncate(data.len() - 3);
        assert!(KifManifest::parse(&data).is_err());
    }

    #[test]
    fn first_duplicate_wins() {
        let mut manifest = KifManifest::new(vec![ArchiveEntry {
            filename: "a.int".into(),
            entry_count: 2,
            encrypted: false,
            key: [0; 4],
        }]);
        let first = AssetLocation {
            archive: 0,
            offset: 1,
            length: 2,
        };
        assert!(manifest.insert("Sys.ogg", first));
        assert!(!manifest.insert("SYS.ogg", AssetLocation { offset: 9, ..first }));
        assert_eq!(manifest.find_entry("sys.ogg"), Some(&first));
    }

    #[test]
    fn opens_manifest_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        let original = KifManifest::parse(&sample_bytes()).unwrap();
        file.write_all(&original.to_bytes()).unwrap();

        let reopened = KifManifest::open(file.path()).unwrap();
        assert_eq!(reopened.path(), Some(file.path()));
        assert_eq!(reopened.archives(), original.archives());
        assert_eq!(
            reopened.find_entry("cg01_1.hg3"),
            original.find_entry("CG01_1.HG3")
        );
    }
}
