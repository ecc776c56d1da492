use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::FormatError;

pub const IMAGE_SIGNATURE: &[u8; 4] = b"HG-3";
const HEADER_SIZE: usize = 4 + 4 + 4;
const FRAME_HEADER_SIZE: usize = 4 + 4;
const TAG_HEADER_SIZE: usize = 8 + 4 + 4;
const STDINFO_SIZE: usize = 10 * 4;
const IMG_SIZE: usize = 6 * 4;

/// Placement metadata carried by every HG-3 frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StdInfo {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub total_width: u32,
    pub total_height: u32,
    pub transparent: bool,
    pub base_x: i32,
    pub base_y: i32,
}

impl StdInfo {
    /// Top-left corner of the frame once the base point is applied.
    pub fn origin(&self) -> (i32, i32) {
        (self.offset_x - self.base_x, self.offset_y - self.base_y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImgInfo {
    pub slice_start: u32,
    pub slice_length: u32,
    pub compressed_data_length: u32,
    pub decompressed_data_length: u32,
    pub compressed_cmd_length: u32,
    pub decompressed_cmd_length: u32,
}

/// One frame of an HG-3 image. Pixel payloads stay compressed; decoding them
/// is the codec's job.
#[derive(Debug, Clone)]
pub struct Hg3Frame<'a> {
    pub id: u32,
    pub info: StdInfo,
    pub img: Option<ImgInfo>,
    pub rle_data: &'a [u8],
    pub rle_cmd: &'a [u8],
}

pub fn parse_frames(bytes: &[u8]) -> Result<Vec<Hg3Frame<'_>>, FormatError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FormatError::truncated("HG-3 header", HEADER_SIZE, bytes.len()));
    }
    if &bytes[..4] != IMAGE_SIGNATURE {
        return Err(FormatError::BadMagic { format: "HG-3" });
    }

    let mut frames = Vec::new();
    let mut frame_start = HEADER_SIZE;
    loop {
        let header = slice(bytes, frame_start, FRAME_HEADER_SIZE, "HG-3 frame header")?;
        let mut cursor = Cursor::new(header);
        let offset_next = cursor.read_u32::<LittleEndian>()? as usize;
        let id = cursor.read_u32::<LittleEndian>()?;

        frames.push(parse_frame(bytes, frame_start + FRAME_HEADER_SIZE, id)?);

        if offset_next == 0 {
            break;
        }
        frame_start += offset_next;
    }
    Ok(frames)
}

/// Reads the placement metadata of the first frame without touching pixels.
pub fn peek_stdinfo(bytes: &[u8]) -> Result<StdInfo, FormatError> {
    let frames = parse_frames(bytes)?;
    frames
        .first()
        .map(|frame| frame.info)
        .ok_or_else(|| FormatError::layout("HG-3 image has no frames"))
}

fn parse_frame(bytes: &[u8], first_tag: usize, id: u32) -> Result<Hg3Frame<'_>, FormatError> {
    let mut info = None;
    let mut img = None;
    let mut rle_data: &[u8] = &[];
    let mut rle_cmd: &[u8] = &[];

    let mut tag_start = first_tag;
    loop {
        let header = slice(bytes, tag_start, TAG_HEADER_SIZE, "HG-3 tag header")?;
        let name_end = header[..8].iter().position(|&b| b == 0).unwrap_or(8);
        let name = &header[..name_end];
        let mut cursor = Cursor::new(&header[8..]);
        let offset_next = cursor.read_u32::<LittleEndian>()? as usize;
        let _length = cursor.read_u32::<LittleEndian>()?;
        let payload_start = tag_start + TAG_HEADER_SIZE;

        match name {
            b"stdinfo" => {
                let payload = slice(bytes, payload_start, STDINFO_SIZE, "stdinfo tag")?;
                info = Some(read_stdinfo(payload)?);
            }
            b"img0000" => {
                let payload = slice(bytes, payload_start, IMG_SIZE, "img0000 tag")?;
                let parsed = read_img(payload)?;
                let data_start = payload_start + IMG_SIZE;
                rle_data = slice(
                    bytes,
                    data_start,
                    parsed.compressed_data_length as usize,
                    "img0000 data",
                )?;
                rle_cmd = slice(
                    bytes,
                    data_start + parsed.compressed_data_length as usize,
                    parsed.compressed_cmd_length as usize,
                    "img0000 commands",
                )?;
                img = Some(parsed);
            }
            _ => {}
        }

        if offset_next == 0 {
            break;
        }
        tag_start += offset_next;
    }

    let info = info.ok_or_else(|| FormatError::layout(format!("frame {id} lacks a stdinfo tag")))?;
    Ok(Hg3Frame {
        id,
        info,
        img,
        rle_data,
        rle_cmd,
    })
}

fn read_stdinfo(payload: &[u8]) -> Result<StdInfo, FormatError> {
    let mut cursor = Cursor::new(payload);
    Ok(StdInfo {
        width: cursor.read_u32::<LittleEndian>()?,
        height: cursor.read_u32::<LittleEndian>()?,
        bit_depth: cursor.read_u32::<LittleEndian>()?,
        offset_x: cursor.read_i32::<LittleEndian>()?,
        offset_y: cursor.read_i32::<LittleEndian>()?,
        total_width: cursor.read_u32::<LittleEndian>()?,
        total_height: cursor.read_u32::<LittleEndian>()?,
        transparent: cursor.read_u32::<LittleEndian>()? != 0,
        base_x: cursor.read_i32::<LittleEndian>()?,
        base_y: cursor.read_i32::<LittleEndian>()?,
    })
}

fn read_img(payload: &[u8]) -> Result<ImgInfo, FormatError> {
    let mut cursor = Cursor::new(payload);
    Ok(ImgInfo {
        slice_start: cursor.read_u32::<LittleEndian>()?,
        slice_length: cursor.read_u32::<LittleEndian>()?,
        compressed_data_length: cursor.read_u32::<LittleEndian>()?,
        decompressed_data_length: cursor.read_u32::<LittleEndian>()?,
        compressed_cmd_length: cursor.read_u32::<LittleEndian>()?,
        decompressed_cmd_length: cursor.read_u32::<LittleEndian>()?,
    })
}

fn slice<'a>(
    bytes: &'a [u8],
    start: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], FormatError> {
    let end = start
        .checked_add(len)
        .ok_or_else(|| FormatError::layout(format!("{what} offset overflow")))?;
    bytes
        .get(start..end)
        .ok_or_else(|| FormatError::truncated(what, end, bytes.len()))
}

/// Writes a single-frame HG-3 image; used to build fixtures.
pub fn build_image(info: &StdInfo, rle_data: &[u8], rle_cmd: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(IMAGE_SIGNATURE);
    out.extend_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&0x300u32.to_le_bytes());
    // single frame
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    let stdinfo_len = TAG_HEADER_SIZE + STDINFO_SIZE;
    out.extend_from_slice(b"stdinfo\0");
    out.extend_from_slice(&(stdinfo_len as u32).to_le_bytes());
    out.extend_from_slice(&(STDINFO_SIZE as u32).to_le_bytes());
    for value in [info.width, info.height, info.bit_depth] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&info.offset_x.to_le_bytes());
    out.extend_from_slice(&info.offset_y.to_le_bytes());
    out.extend_from_slice(&info.total_width.to_le_bytes());
    out.extend_from_slice(&info.total_height.to_le_bytes());
    out.extend_from_slice(&u32::from(info.transparent).to_le_bytes());
    out.extend_from_slice(&info.base_x.to_le_bytes());
    out.extend_from_slice(&info.base_y.to_le_bytes());

    let img_len = IMG_SIZE + rle_data.len() + rle_cmd.len();
    out.extend_from_slice(b"img0000\0");
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(img_len as u32).to_le_bytes());
    for value in [
        0,
        info.height,
        rle_data.len() as u32,
        rle_data.len() as u32,
        rle_cmd.len() as u32,
        rle_cmd.len() as u32,
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(rle_data);
    out.extend_from_slice(rle_cmd);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> StdInfo {
        StdInfo {
            width: 4,
            height: 2,
            bit_depth: 32,
            offset_x: 300,
            offset_y: 40,
            total_width: 1024,
            total_height: 576,
            transparent: true,
            base_x: 100,
            base_y: 10,
        }
    }

    #[test]
    fn reads_stdinfo_and_payload_slices() {
        let bytes = build_image(&info(), b"DATA", b"CM");
        let frames = parse_frames(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.info, info());
        assert_eq!(frame.info.origin(), (200, 30));
        assert_eq!(frame.rle_data, b"DATA");
        assert_eq!(frame.rle_cmd, b"CM");
        assert_eq!(frame.img.unwrap().compressed_cmd_length, 2);
        assert_eq!(peek_stdinfo(&bytes).unwrap().width, 4);
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut bytes = build_image(&info(), b"", b"");
        bytes[3] = b'X';
        assert!(matches!(
            parse_frames(&bytes),
            Err(FormatError::BadMagic { .. })
        ));
    }

    #[test]
    fn reports_truncated_payload() {
        let mut bytes = build_image(&info(), b"DATA", b"CM");
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            parse_frames(&bytes),
            Err(FormatError::Truncated { .. })
        ));
    }
}
