use serde::Deserialize;

use crate::error::StageError;
use crate::transform::{ByteReader, Transform};

const GIF87A: &[u8] = b"GIF87a";
const GIF89A: &[u8] = b"GIF89a";

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;
const COMMENT_LABEL: u8 = 0xFE;
const APPLICATION_LABEL: u8 = 0xFF;

/// Application extensions that control animation and are always kept.
const LOOPING_APPLICATIONS: [&[u8]; 2] = [b"NETSCAPE2.0", b"ANIMEXTS1.0"];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GifOptions {
    pub strip_comments: bool,
    pub strip_application: bool,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            strip_comments: true,
            strip_application: false,
        }
    }
}

/// Drops comment (and optionally application) extension blocks.
pub struct GifTransform {
    options: GifOptions,
}

impl GifTransform {
    pub fn new(options: GifOptions) -> Self {
        Self { options }
    }

    fn keep_extension(&self, label: u8, first_block: &[u8]) -> bool {
        match label {
            COMMENT_LABEL => !self.options.strip_comments,
            APPLICATION_LABEL if self.options.strip_application => {
                LOOPING_APPLICATIONS.iter().any(|app| *app == first_block)
            }
            _ => true,
        }
    }
}

impl Transform for GifTransform {
    fn name(&self) -> &str {
        "gif"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
        if !input.starts_with(GIF87A) && !input.starts_with(GIF89A) {
            return Ok(input.to_vec());
        }

        let mut reader = ByteReader::new(input);
        let mut out = Vec::with_capacity(input.len());

        out.extend_from_slice(reader.read_exact(6)?);
        let lsd = reader.read_exact(7)?;
        out.extend_from_slice(lsd);
        if let Some(table) = color_table_len(lsd[4]) {
            out.extend_from_slice(reader.read_exact(table)?);
        }

        loop {
            let block_id = reader.read_u8()?;
            match block_id {
                TRAILER => {
                    out.push(TRAILER);
                    break;
                }
                EXTENSION_INTRODUCER => {
                    let start = reader.position() - 1;
                    let label = reader.read_u8()?;
                    let first = read_sub_blocks(&mut reader)?;
                    if self.keep_extension(label, first) {
                        out.extend_from_slice(reader.slice(start, reader.position()));
                    }
                }
                IMAGE_SEPARATOR => {
                    let start = reader.position() - 1;
                    let desc = reader.read_exact(9)?;
                    if let Some(table) = color_table_len(desc[8]) {
                        reader.read_exact(table)?;
                    }
                    reader.read_u8()?; // LZW min code size
                    read_sub_blocks(&mut reader)?;
                    out.extend_from_slice(reader.slice(start, reader.position()));
                }
                other => {
                    return Err(StageError::Malformed(format!(
                        "gif block id 0x{other:02X} invalid"
                    )));
                }
            }
        }

        Ok(out)
    }
}

fn color_table_len(packed: u8) -> Option<usize> {
    if packed & 0b1000_0000 == 0 {
        return None;
    }
    let size_pow = (packed & 0b0000_0111) as u32;
    Some(3 * (1usize << (size_pow + 1)))
}

/// Skip a sub-block sequence, returning the first sub-block's data.
fn read_sub_blocks<'a>(reader: &mut ByteReader<'a>) -> Result<&'a [u8], StageError> {
    let mut first: Option<&'a [u8]> = None;
    loop {
        let size = reader.read_u8()?;
        if size == 0 {
            break;
        }
        let data = reader.read_exact(size as usize)?;
        first.get_or_insert(data);
    }
    Ok(first.unwrap_or(&[]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_sub_blocks(out: &mut Vec<u8>, data: &[u8]) {
        for chunk in data.chunks(255) {
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
        out.push(0);
    }

    /// 1x1 GIF89a with a comment and a NETSCAPE loop extension.
    fn sample_gif() -> Vec<u8> {
        let mut gif = Vec::new();
        gif.extend_from_slice(GIF89A);
        gif.extend_from_slice(&[1, 0, 1, 0, 0b1000_0000, 0, 0]);
        gif.extend_from_slice(&[0, 0, 0, 255, 255, 255]);
        gif.extend_from_slice(&[0x21, 0xFF]);
        push_sub_blocks(&mut gif, b"NETSCAPE2.0");
        gif.extend_from_slice(&[0x21, 0xFE]);
        push_sub_blocks(&mut gif, b"made with a very long comment");
        gif.extend_from_slice(&[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0]);
        gif.push(2);
        push_sub_blocks(&mut gif, &[0x4C, 0x01]);
        gif.push(TRAILER);
        gif
    }

    #[test]
    fn strips_comment_extension() {
        let input = sample_gif();
        let out = GifTransform::new(GifOptions::default())
            .transform(&input)
            .expect("gif");
        assert!(out.len() < input.len());
        assert!(!out.windows(4).any(|w| w == b"made"));
        assert!(out.windows(11).any(|w| w == b"NETSCAPE2.0"));
        assert_eq!(out.last(), Some(&TRAILER));
    }

    #[test]
    fn keeps_comment_when_disabled() {
        let input = sample_gif();
        let options = GifOptions {
            strip_comments: false,
            strip_application: false,
        };
        let out = GifTransform::new(options).transform(&input).expect("gif");
        assert_eq!(out, input);
    }

    #[test]
    fn looping_extension_survives_application_stripping() {
        let input = sample_gif();
        let options = GifOptions {
            strip_comments: true,
            strip_application: true,
        };
        let out = GifTransform::new(options).transform(&input).expect("gif");
        assert!(out.windows(11).any(|w| w == b"NETSCAPE2.0"));
    }

    #[test]
    fn truncated_gif_is_an_error() {
        let mut input = sample_gif();
        input.truncate(input.len() - 4);
        let err = GifTransform::new(GifOptions::default())
            .transform(&input)
            .expect_err("truncated");
        assert!(matches!(err, StageError::Eof));
    }

    #[test]
    fn non_gif_passes_through() {
        let out = GifTransform::new(GifOptions::default())
            .transform(b"\x89PNG")
            .expect("gif");
        assert_eq!(out, b"\x89PNG".to_vec());
    }
}
