//! Firmware and FPGA image files.
//!
//! FPGA bitstreams are opaque and only checked for size by the board.
//! Firmware images use the FX3 boot image layout:
//!
//! ```text
//! "CY" ctl 0xB0
//! { u32 length_words, u32 address, length_words * u32 data }*
//! u32 0, u32 entry_address
//! u32 checksum            wrapping sum of every data word
//! ```
//!
//! All words are little-endian.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

const SIGNATURE: &[u8; 2] = b"CY";
const IMAGE_TYPE: u8 = 0xB0;

/// Read an image file in full
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|err| {
        let mapped = Error::from(err);
        log::debug!("reading {:?} failed: {}", path, mapped);
        mapped
    })?;
    if data.is_empty() {
        return Err(Error::InvalidParameter(format!("{:?} is empty", path)));
    }
    Ok(data)
}

/// One load section of a firmware image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub address: u32,
    pub data: Vec<u32>,
}

/// Validated firmware image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    pub sections: Vec<Section>,
    pub entry: u32,
    pub checksum: u32,
}

struct WordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl WordReader<'_> {
    fn next(&mut self) -> Result<u32> {
        let bytes = self
            .data
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| Error::InvalidParameter("firmware image is truncated".into()))?;
        self.pos += 4;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl FirmwareImage {
    pub fn parse(image: &[u8]) -> Result<Self> {
        if image.len() < 4 || &image[0..2] != SIGNATURE || image[3] != IMAGE_TYPE {
            return Err(Error::InvalidParameter("not a firmware image".into()));
        }

        let mut reader = WordReader { data: image, pos: 4 };
        let mut sections = Vec::new();
        let mut sum = 0u32;

        let entry = loop {
            let length = reader.next()? as usize;
            let address = reader.next()?;
            if length == 0 {
                break address;
            }
            if length > (image.len() - reader.pos) / 4 {
                return Err(Error::InvalidParameter(format!(
                    "section at {:#x} runs past the end of the image",
                    address
                )));
            }
            let data = (0..length)
                .map(|_| reader.next())
                .collect::<Result<Vec<u32>>>()?;
            sum = data.iter().fold(sum, |acc, word| acc.wrapping_add(*word));
            sections.push(Section { address, data });
        };

        let checksum = reader.next()?;
        if checksum != sum {
            return Err(Error::Checksum(format!(
                "image checksum {:#010x}, computed {:#010x}",
                checksum, sum
            )));
        }

        Ok(Self {
            sections,
            entry,
            checksum,
        })
    }

    /// Total payload size in bytes
    pub fn payload_len(&self) -> usize {
        self.sections.iter().map(|section| section.data.len() * 4).sum()
    }
}
