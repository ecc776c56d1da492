pub mod crypt;
pub mod cst;
pub mod error;
pub mod hg3;
pub mod kif;
pub mod zlib;

pub use crypt::{decrypt_entry, encrypt_entry};
pub use cst::{CatScene, RecordKind, ScriptRecord, build_scene};
pub use error::FormatError;
pub use hg3::{Hg3Frame, ImgInfo, StdInfo, parse_frames, peek_stdinfo};
pub use kif::{ArchiveEntry, AssetLocation, KifManifest, normalize_name};
pub use zlib::{deflate, inflate};
