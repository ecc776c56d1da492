use blowfish::BlowfishLE;
use blowfish::cipher::generic_array::GenericArray;
use blowfish::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::FormatError;

pub const BLOCK_SIZE: usize = 8;

fn cipher(key: &[u8; 4]) -> Result<BlowfishLE, FormatError> {
    BlowfishLE::new_from_slice(key).map_err(|err| FormatError::Cipher(err.to_string()))
}

/// Decrypts an archive entry in place.
///
/// Only the largest multiple-of-8 prefix is enciphered in KIF archives; the
/// trailing partial block is stored as-is and is left untouched here.
pub fn decrypt_entry(key: &[u8; 4], data: &mut [u8]) -> Result<(), FormatError> {
    let cipher = cipher(key)?;
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

/// Inverse of [`decrypt_entry`], used when packing fixtures.
pub fn encrypt_entry(key: &[u8; 4], data: &mut [u8]) -> Result<(), FormatError> {
    let cipher = cipher(key)?;
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(())
}
