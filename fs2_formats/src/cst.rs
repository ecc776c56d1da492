use std::borrow::Cow;
use std::io::Cursor;
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::FormatError;
use crate::zlib::{deflate, inflate};

pub const SCRIPT_SIGNATURE: &[u8; 8] = b"CatScene";
const CONTAINER_HEADER_SIZE: usize = 8 + 4 + 4;
const BODY_HEADER_SIZE: usize = 4 * 4;
const OFFSET_ENTRY_SIZE: usize = 4;

/// Record kinds found in the string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// 0x02: wait for input after a message.
    Wait,
    /// 0x03: novel page break, then wait for input.
    PageBreak,
    /// 0x20: message text.
    Message,
    /// 0x21: speaker name for the next message.
    Speaker,
    /// 0x30: free-form engine command.
    Command,
    /// 0xF0: name of the source script file.
    SourceFile,
    /// 0xF1: line number in the source script file.
    LineMarker,
    Unknown(u8),
}

impl RecordKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x02 => RecordKind::Wait,
            0x03 => RecordKind::PageBreak,
            0x20 => RecordKind::Message,
            0x21 => RecordKind::Speaker,
            0x30 => RecordKind::Command,
            0xF0 => RecordKind::SourceFile,
            0xF1 => RecordKind::LineMarker,
            other => RecordKind::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            RecordKind::Wait => 0x02,
            RecordKind::PageBreak => 0x03,
            RecordKind::Message => 0x20,
            RecordKind::Speaker => 0x21,
            RecordKind::Command => 0x30,
            RecordKind::SourceFile => 0xF0,
            RecordKind::LineMarker => 0xF1,
            RecordKind::Unknown(other) => other,
        }
    }

    pub fn waits_for_input(self) -> bool {
        matches!(self, RecordKind::Wait | RecordKind::PageBreak)
    }
}

/// Borrowed view of one string-table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptRecord<'a> {
    pub flag: u8,
    pub kind: RecordKind,
    pub raw: &'a [u8],
}

impl<'a> ScriptRecord<'a> {
    pub fn text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.raw)
    }
}

/// A decoded `.cst` scene container.
#[derive(Debug, Clone)]
pub struct CatScene {
    pub compressed_size: u32,
    pub decompressed_size: u32,
    pub script_length: u32,
    pub input_count: u32,
    body: Vec<u8>,
    offsets: Vec<u32>,
    string_table: Range<usize>,
}

impl CatScene {
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < CONTAINER_HEADER_SIZE {
            return Err(FormatError::truncated(
                "scene header",
                CONTAINER_HEADER_SIZE,
                bytes.len(),
            ));
        }
        if &bytes[..8] != SCRIPT_SIGNATURE {
            return Err(FormatError::BadMagic { format: "CatScene" });
        }

        let mut cursor = Cursor::new(&bytes[8..CONTAINER_HEADER_SIZE]);
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let decompressed_size = cursor.read_u32::<LittleEndian>()?;
        let payload = &bytes[CONTAINER_HEADER_SIZE..];

        let body = if compressed_size == 0 {
            let size = decompressed_size as usize;
            if payload.len() < size {
                return Err(FormatError::truncated("scene body", size, payload.len()));
            }
            payload[..size].to_vec()
        } else {
            let size = compressed_size as usize;
            if payload.len() < size {
                return Err(FormatError::truncated(
                    "compressed scene body",
                    size,
                    payload.len(),
                ));
            }
            inflate(&payload[..size], decompressed_size as usize)?
        };

        let mut scene = Self::from_body(body)?;
        scene.compressed_size = compressed_size;
        scene.decompressed_size = decompressed_size;
        Ok(scene)
    }

    fn from_body(body: Vec<u8>) -> Result<Self, FormatError> {
        if body.len() < BODY_HEADER_SIZE {
            return Err(FormatError::truncated(
                "script data header",
                BODY_HEADER_SIZE,
                body.len(),
            ));
        }

        let mut cursor = Cursor::new(&body[..BODY_HEADER_SIZE]);
        let script_length = cursor.read_u32::<LittleEndian>()?;
        let input_count = cursor.read_u32::<LittleEndian>()?;
        let offset_table_offset = cursor.read_u32::<LittleEndian>()? as usize;
        let string_table_offset = cursor.read_u32::<LittleEndian>()? as usize;

        let offset_table_start = BODY_HEADER_SIZE + offset_table_offset;
        let string_table_start = BODY_HEADER_SIZE + string_table_offset;
        if string_table_offset < offset_table_offset {
            return Err(FormatError::layout(format!(
                "string table at {string_table_offset:#x} precedes offset table at {offset_table_offset:#x}"
            )));
        }
        if string_table_start > body.len() {
            return Err(FormatError::layout(format!(
                "string table at {string_table_offset:#x} lies beyond the {} byte body",
                body.len()
            )));
        }

        let entry_count = (string_table_offset - offset_table_offset) / OFFSET_ENTRY_SIZE;
        let mut cursor = Cursor::new(&body[offset_table_start..string_table_start]);
        let mut offsets = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            offsets.push(cursor.read_u32::<LittleEndian>()?);
        }

        let string_table = string_table_start..body.len();
        let table = &body[string_table.clone()];
        for (index, &offset) in offsets.iter().enumerate() {
            let start = offset as usize;
            let text_start = start + 2;
            if text_start > table.len() {
                return Err(FormatError::layout(format!(
                    "record {index} offset {offset:#x} lies beyond the string table"
                )));
            }
            if !table[text_start..].contains(&0) {
                return Err(FormatError::layout(format!(
                    "record {index} at {offset:#x} is not null-terminated"
                )));
            }
        }

        Ok(CatScene {
            compressed_size: 0,
            decompressed_size: body.len() as u32,
            script_length,
            input_count,
            body,
            offsets,
            string_table,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<ScriptRecord<'_>> {
        let offset = *self.offsets.get(index)? as usize;
        let table = &self.body[self.string_table.clone()];
        let record = &table[offset..];
        let text = &record[2..];
        let end = text.iter().position(|&b| b == 0)?;
        Some(ScriptRecord {
            flag: record[0],
            kind: RecordKind::from_byte(record[1]),
            raw: &text[..end],
        })
    }

    pub fn records(&self) -> impl Iterator<Item = ScriptRecord<'_>> {
        (0..self.len()).filter_map(move |index| self.record(index))
    }
}

/// Assembles a `.cst` container from `(kind, text)` pairs.
///
/// The offset table immediately follows the data header and the string table
/// follows the offset table, as the retail compiler lays them out.
pub fn build_scene(records: &[(RecordKind, &str)], compress: bool) -> Vec<u8> {
    let mut strings = Vec::new();
    let mut offsets = Vec::with_capacity(records.len());
    let mut inputs = 0u32;
    for (kind, text) in records {
        offsets.push(strings.len() as u32);
        strings.push(0x01);
        strings.push(kind.to_byte());
        strings.extend_from_slice(text.as_bytes());
        strings.push(0);
        if kind.waits_for_input() {
            inputs += 1;
        }
    }

    let offset_table_len = (offsets.len() * OFFSET_ENTRY_SIZE) as u32;
    let mut body = Vec::new();
    let script_length = (BODY_HEADER_SIZE as u32) + offset_table_len + strings.len() as u32;
    body.extend_from_slice(&script_length.to_le_bytes());
    body.extend_from_slice(&inputs.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&offset_table_len.to_le_bytes());
    for offset in offsets {
        body.extend_from_slice(&offset.to_le_bytes());
    }
    body.extend_from_slice(&strings);

    let mut out = Vec::with_capacity(CONTAINER_HEADER_SIZE + body.len());
    out.extend_from_slice(SCRIPT_SIGNATURE);
    if compress {
        let packed = deflate(&body);
        out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&packed);
    } else {
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
    }
    out
}
