use serde::Deserialize;

use crate::error::StageError;
use crate::transform::{ByteReader, Transform};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const TEXT_CHUNKS: [&[u8; 4]; 4] = [b"tEXt", b"zTXt", b"iTXt", b"tIME"];

/// Ancillary chunks that change how pixels render.
const RENDERING_CHUNKS: [&[u8; 4]; 10] = [
    b"tRNS", b"gAMA", b"cHRM", b"sRGB", b"iCCP", b"sBIT", b"pHYs", b"acTL", b"fcTL", b"fdAT",
];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PngOptions {
    /// 0 leaves the file untouched, 1 drops text chunks, 2+ drops every
    /// ancillary chunk that does not affect rendering.
    pub optimization_level: u8,
}

impl Default for PngOptions {
    fn default() -> Self {
        Self {
            optimization_level: 2,
        }
    }
}

pub struct PngTransform {
    options: PngOptions,
}

impl PngTransform {
    pub fn new(options: PngOptions) -> Self {
        Self { options }
    }

    fn keep_chunk(&self, chunk_type: &[u8; 4]) -> bool {
        let ancillary = chunk_type[0] & 0x20 != 0;
        if !ancillary {
            return true;
        }
        match self.options.optimization_level {
            0 => true,
            1 => !TEXT_CHUNKS.iter().any(|t| *t == chunk_type),
            _ => RENDERING_CHUNKS.iter().any(|t| *t == chunk_type),
        }
    }
}

impl Transform for PngTransform {
    fn name(&self) -> &str {
        "png"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
        if !input.starts_with(&PNG_SIGNATURE) {
            return Ok(input.to_vec());
        }
        if self.options.optimization_level == 0 {
            return Ok(input.to_vec());
        }

        let mut reader = ByteReader::new(input);
        let mut out = Vec::with_capacity(input.len());
        out.extend_from_slice(reader.read_exact(PNG_SIGNATURE.len())?);

        loop {
            let start = reader.position();
            let len_bytes = reader.read_exact(4)?;
            let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
            let typ_bytes = reader.read_exact(4)?;
            let chunk_type: [u8; 4] = [typ_bytes[0], typ_bytes[1], typ_bytes[2], typ_bytes[3]];
            if !chunk_type.iter().all(u8::is_ascii_alphabetic) {
                return Err(StageError::Malformed("png chunk type invalid".to_string()));
            }
            if len as usize > reader.remaining() {
                return Err(StageError::Eof);
            }
            reader.read_exact(len as usize)?;
            reader.read_exact(4)?; // CRC

            if self.keep_chunk(&chunk_type) {
                out.extend_from_slice(reader.slice(start, reader.position()));
            }
            if &chunk_type == b"IEND" {
                break;
            }
        }

        Ok(out)
    }
}
