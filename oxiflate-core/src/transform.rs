//! Block cipher transforms applied to compressed bytes.
//!
//! The compression stream runs every compressed chunk through an optional
//! encrypting [`CryptoTransform`] before it reaches the sink; the decompression
//! side runs raw input through a decrypting one before the decoder sees it.
//!
//! [`ZipCryptoEncryptor`] and [`ZipCryptoDecryptor`] implement the traditional
//! PKWARE stream cipher. **Security Warning**: this cipher is cryptographically
//! weak and exists only for legacy compatibility.
//!
//! ## Example
//!
//! ```rust
//! use oxiflate_core::transform::{CryptoTransform, ZipCryptoDecryptor, ZipCryptoEncryptor};
//!
//! let mut data = b"Hello, World!".to_vec();
//! ZipCryptoEncryptor::new(b"secret").transform_in_place(&mut data).unwrap();
//! assert_ne!(&data, b"Hello, World!");
//!
//! ZipCryptoDecryptor::new(b"secret").transform_in_place(&mut data).unwrap();
//! assert_eq!(&data, b"Hello, World!");
//! ```

use crate::error::{OxiflateError, Result};

/// A stateful transform over a byte stream.
pub trait CryptoTransform: Send {
    /// Transform `input` into the front of `output`, returning the byte count.
    fn transform_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize>;

    /// Transform `buffer` in place.
    fn transform_in_place(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let input = buffer.to_vec();
        self.transform_block(&input, buffer)
    }

    /// Authentication code produced once the stream is complete, if any.
    fn authentication_code(&mut self) -> Option<Vec<u8>> {
        None
    }
}

impl<T: CryptoTransform + ?Sized> CryptoTransform for Box<T> {
    fn transform_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        (**self).transform_block(input, output)
    }

    fn transform_in_place(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).transform_in_place(buffer)
    }

    fn authentication_code(&mut self) -> Option<Vec<u8>> {
        (**self).authentication_code()
    }
}

/// CRC-32 lookup table (polynomial 0xEDB88320, reflected).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

#[inline]
fn crc32_update(crc: u32, byte: u8) -> u32 {
    CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

/// Key state of the PKWARE stream cipher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipCryptoKeys {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl Default for ZipCryptoKeys {
    fn default() -> Self {
        Self {
            key0: 0x12345678,
            key1: 0x23456789,
            key2: 0x34567890,
        }
    }
}

impl ZipCryptoKeys {
    /// Derive the key state from a password.
    #[must_use]
    pub fn from_password(password: &[u8]) -> Self {
        let mut keys = Self::default();
        for &byte in password {
            keys.update(byte);
        }
        keys
    }

    /// Current `(key0, key1, key2)`.
    #[must_use]
    pub fn keys(&self) -> (u32, u32, u32) {
        (self.key0, self.key1, self.key2)
    }

    #[inline]
    fn update(&mut self, plain: u8) {
        self.key0 = crc32_update(self.key0, plain);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xFF)
            .wrapping_mul(134775813)
            .wrapping_add(1);
        self.key2 = crc32_update(self.key2, (self.key1 >> 24) as u8);
    }

    #[inline]
    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }
}

fn check_output(input: &[u8], output: &[u8]) -> Result<()> {
    if output.len() < input.len() {
        return Err(OxiflateError::invalid_argument(format!(
            "transform output holds {} bytes, input has {}",
            output.len(),
            input.len()
        )));
    }
    Ok(())
}

/// Encrypting half of the PKWARE cipher.
#[derive(Debug, Clone)]
pub struct ZipCryptoEncryptor {
    keys: ZipCryptoKeys,
}

impl ZipCryptoEncryptor {
    /// Create an encryptor keyed by `password`.
    #[must_use]
    pub fn new(password: &[u8]) -> Self {
        Self::with_keys(ZipCryptoKeys::from_password(password))
    }

    /// Create an encryptor from an explicit key state.
    #[must_use]
    pub fn with_keys(keys: ZipCryptoKeys) -> Self {
        Self { keys }
    }

    /// Encrypt a single byte.
    #[inline]
    pub fn encrypt_byte(&mut self, byte: u8) -> u8 {
        let cipher = byte ^ self.keys.stream_byte();
        self.keys.update(byte);
        cipher
    }
}

impl CryptoTransform for ZipCryptoEncryptor {
    fn transform_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        check_output(input, output)?;
        for (out, &byte) in output.iter_mut().zip(input) {
            *out = self.encrypt_byte(byte);
        }
        Ok(input.len())
    }

    fn transform_in_place(&mut self, buffer: &mut [u8]) -> Result<usize> {
        for byte in buffer.iter_mut() {
            *byte = self.encrypt_byte(*byte);
        }
        Ok(buffer.len())
    }
}

/// Decrypting half of the PKWARE cipher.
#[derive(Debug, Clone)]
pub struct ZipCryptoDecryptor {
    keys: ZipCryptoKeys,
}

impl ZipCryptoDecryptor {
    /// Create a decryptor keyed by `password`.
    #[must_use]
    pub fn new(password: &[u8]) -> Self {
        Self::with_keys(ZipCryptoKeys::from_password(password))
    }

    /// Create a decryptor from an explicit key state.
    #[must_use]
    pub fn with_keys(keys: ZipCryptoKeys) -> Self {
        Self { keys }
    }

    /// Decrypt a single byte.
    #[inline]
    pub fn decrypt_byte(&mut self, byte: u8) -> u8 {
        let plain = byte ^ self.keys.stream_byte();
        self.keys.update(plain);
        plain
    }
}

impl CryptoTransform for ZipCryptoDecryptor {
    fn transform_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        check_output(input, output)?;
        for (out, &byte) in output.iter_mut().zip(input) {
            *out = self.decrypt_byte(byte);
        }
        Ok(input.len())
    }

    fn transform_in_place(&mut self, buffer: &mut [u8]) -> Result<usize> {
        for byte in buffer.iter_mut() {
            *byte = self.decrypt_byte(*byte);
        }
        Ok(buffer.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_keys() {
        let keys = ZipCryptoKeys::default();
        assert_eq!(keys.keys(), (0x12345678, 0x23456789, 0x34567890));
        assert_ne!(ZipCryptoKeys::from_password(b"pw").keys(), keys.keys());
    }

    #[test]
    fn test_round_trip_in_blocks() {
        let plain: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut enc = ZipCryptoEncryptor::new(b"password");
        let mut cipher = vec![0u8; plain.len()];
        // Split into uneven blocks; the keystream must carry across calls.
        let n = enc.transform_block(&plain[..333], &mut cipher[..333]).unwrap();
        assert_eq!(n, 333);
        enc.transform_block(&plain[333..], &mut cipher[333..]).unwrap();
        assert_ne!(cipher, plain);

        let mut dec = ZipCryptoDecryptor::new(b"password");
        dec.transform_in_place(&mut cipher).unwrap();
        assert_eq!(cipher, plain);
    }

    #[test]
    fn test_wrong_password() {
        let mut data = b"secret payload".to_vec();
        ZipCryptoEncryptor::new(b"right").transform_in_place(&mut data).unwrap();
        ZipCryptoDecryptor::new(b"wrong").transform_in_place(&mut data).unwrap();
        assert_ne!(&data, b"secret payload");
    }

    #[test]
    fn test_short_output_rejected() {
        let mut enc = ZipCryptoEncryptor::new(b"pw");
        let mut out = [0u8; 2];
        assert!(matches!(
            enc.transform_block(b"abc", &mut out),
            Err(OxiflateError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_default_authentication_code() {
        let mut dec = ZipCryptoDecryptor::new(b"pw");
        assert!(dec.authentication_code().is_none());
    }
}
