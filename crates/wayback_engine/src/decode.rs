use std::borrow::Cow;
use std::io::Write;

use encoding_rs::UTF_8;
use flate2::write::{DeflateDecoder, GzDecoder};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decompress {encoding} body: {message}")]
    Decompress {
        encoding: &'static str,
        message: String,
    },
    #[error("line {line} is not valid UTF-8")]
    InvalidUtf8 { line: u64 },
}

/// Body encoding announced by the `Content-Encoding` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// Unknown or absent encodings pass through untouched.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => ContentEncoding::Gzip,
            Some("deflate") => ContentEncoding::Deflate,
            _ => ContentEncoding::Identity,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Deflate => "deflate",
        }
    }
}

/// Push-style decompressor: feed network chunks in, get plain bytes out.
pub struct BodyDecoder {
    inner: Inner,
    received: bool,
}

enum Inner {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(DeflateDecoder<Vec<u8>>),
}

impl BodyDecoder {
    pub fn new(encoding: ContentEncoding) -> Self {
        let inner = match encoding {
            ContentEncoding::Identity => Inner::Identity,
            ContentEncoding::Gzip => Inner::Gzip(GzDecoder::new(Vec::new())),
            ContentEncoding::Deflate => Inner::Deflate(DeflateDecoder::new(Vec::new())),
        };
        Self {
            inner,
            received: false,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<u8>, DecodeError> {
        self.received |= !chunk.is_empty();
        match &mut self.inner {
            Inner::Identity => Ok(chunk.to_vec()),
            Inner::Gzip(decoder) => {
                decoder
                    .write_all(chunk)
                    .map_err(|err| decompress_error(ContentEncoding::Gzip, err))?;
                Ok(std::mem::take(decoder.get_mut()))
            }
            Inner::Deflate(decoder) => {
                decoder
                    .write_all(chunk)
                    .map_err(|err| decompress_error(ContentEncoding::Deflate, err))?;
                Ok(std::mem::take(decoder.get_mut()))
            }
        }
    }

    /// Flushes whatever the decompressor still buffers. A compressed body
    /// with no bytes at all is an empty body, not a truncated stream.
    pub fn finish(self) -> Result<Vec<u8>, DecodeError> {
        if !self.received {
            return Ok(Vec::new());
        }
        match self.inner {
            Inner::Identity => Ok(Vec::new()),
            Inner::Gzip(decoder) => decoder
                .finish()
                .map_err(|err| decompress_error(ContentEncoding::Gzip, err)),
            Inner::Deflate(decoder) => decoder
                .finish()
                .map_err(|err| decompress_error(ContentEncoding::Deflate, err)),
        }
    }
}

fn decompress_error(encoding: ContentEncoding, err: std::io::Error) -> DecodeError {
    DecodeError::Decompress {
        encoding: encoding.name(),
        message: err.to_string(),
    }
}

/// Splits a UTF-8 byte stream into lines. `\n` terminates a line and a
/// preceding `\r` is dropped; a final unterminated line is still a line.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
    decoded: u64,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, DecodeError> {
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut search = scan_from;
        while let Some(offset) = self.pending[search..].iter().position(|b| *b == b'\n') {
            let end = search + offset;
            let line = self.decode_line(start, end)?;
            lines.push(line);
            start = end + 1;
            search = start;
        }
        self.pending.drain(..start);
        Ok(lines)
    }

    pub fn finish(mut self) -> Result<Option<String>, DecodeError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let end = self.pending.len();
        self.decode_line(0, end).map(Some)
    }

    fn decode_line(&mut self, start: usize, end: usize) -> Result<String, DecodeError> {
        let mut raw = &self.pending[start..end];
        if self.decoded == 0 {
            raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
        }
        raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        self.decoded += 1;
        UTF_8
            .decode_without_bom_handling_and_without_replacement(raw)
            .map(Cow::into_owned)
            .ok_or(DecodeError::InvalidUtf8 { line: self.decoded })
    }
}
