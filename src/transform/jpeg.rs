use serde::Deserialize;

use crate::error::StageError;
use crate::transform::{ByteReader, Transform};

const SOI: [u8; 2] = [0xFF, 0xD8];
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const MARKER_COM: u8 = 0xFE;
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP2: u8 = 0xE2;
const MARKER_APP14: u8 = 0xEE;
const MARKER_APP15: u8 = 0xEF;

const ICC_PROFILE_ID: &[u8] = b"ICC_PROFILE\0";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JpegOptions {
    pub strip_metadata: bool,
    pub keep_icc: bool,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self {
            strip_metadata: true,
            keep_icc: true,
        }
    }
}

/// Drops COM and metadata APPn segments; scan data is copied verbatim.
pub struct JpegTransform {
    options: JpegOptions,
}

impl JpegTransform {
    pub fn new(options: JpegOptions) -> Self {
        Self { options }
    }

    fn keep_segment(&self, marker: u8, payload: &[u8]) -> bool {
        if !self.options.strip_metadata {
            return true;
        }
        match marker {
            MARKER_COM => false,
            MARKER_APP0 | MARKER_APP14 => true,
            MARKER_APP2 => self.options.keep_icc && payload.starts_with(ICC_PROFILE_ID),
            m if (MARKER_APP0..=MARKER_APP15).contains(&m) => false,
            _ => true,
        }
    }
}

impl Transform for JpegTransform {
    fn name(&self) -> &str {
        "jpeg"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
        if !input.starts_with(&SOI) {
            return Ok(input.to_vec());
        }

        let mut reader = ByteReader::new(input);
        let mut out = Vec::with_capacity(input.len());
        out.extend_from_slice(reader.read_exact(2)?);

        loop {
            if reader.read_u8()? != 0xFF {
                return Err(StageError::Malformed(format!(
                    "jpeg marker expected at offset {}",
                    reader.position() - 1
                )));
            }
            let mut marker = reader.read_u8()?;
            while marker == 0xFF {
                marker = reader.read_u8()?; // fill bytes
            }

            match marker {
                MARKER_EOI => {
                    out.extend_from_slice(&[0xFF, MARKER_EOI]);
                    break;
                }
                0x01 | 0xD0..=0xD7 => {
                    out.extend_from_slice(&[0xFF, marker]);
                }
                _ => {
                    let len_bytes = reader.read_exact(2)?;
                    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                    if len < 2 {
                        return Err(StageError::Malformed(format!(
                            "jpeg segment 0x{marker:02X} length {len} invalid"
                        )));
                    }
                    let payload = reader.read_exact(len - 2)?;
                    if self.keep_segment(marker, payload) {
                        out.extend_from_slice(&[0xFF, marker]);
                        out.extend_from_slice(len_bytes);
                        out.extend_from_slice(payload);
                    }
                    if marker == MARKER_SOS {
                        // entropy-coded data and everything after it
                        out.extend_from_slice(reader.rest());
                        break;
                    }
                }
            }
        }

        Ok(out)
    }
}
