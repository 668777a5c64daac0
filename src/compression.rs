//! Compression adapter for save streams.
//!
//! Saves are either plain XML or gzip-compressed XML. Detection uses the file
//! suffix first and falls back to sniffing the gzip magic number, so renamed
//! files still open correctly.

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

/// Gzip magic number (RFC 1952).
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Check whether a path holds a gzip stream.
///
/// A `.gz` suffix is trusted without touching the file; anything else is
/// sniffed. Files shorter than two bytes are treated as plain.
pub fn is_compressed(path: &Path) -> io::Result<bool> {
    if has_gzip_suffix(path) {
        return Ok(true);
    }

    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file.read(&mut magic[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(magic == GZIP_MAGIC)
}

/// True when the file name ends in `.gz` (case-insensitive).
pub fn has_gzip_suffix(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Open a save for reading, transparently decompressing it when needed.
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let compressed = is_compressed(path)?;
    let file = File::open(path)?;
    log::debug!(
        "opening {} ({})",
        path.display(),
        if compressed { "gzip" } else { "plain" }
    );

    if compressed {
        let decoder = MultiGzDecoder::new(BufReader::with_capacity(READ_BUFFER_CAPACITY, file));
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER_CAPACITY,
            decoder,
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER_CAPACITY, file)))
    }
}

/// Output stream that optionally gzip-compresses everything written to it.
///
/// Call [`OutputStream::finish`] to write the gzip trailer; dropping a
/// compressing stream without finishing it leaves a truncated archive.
pub enum OutputStream<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> OutputStream<W> {
    /// Wrap `inner`, compressing with the fastest gzip level when `compress` is set.
    pub fn new(inner: W, compress: bool) -> Self {
        if compress {
            OutputStream::Gzip(GzEncoder::new(inner, Compression::fast()))
        } else {
            OutputStream::Plain(inner)
        }
    }

    /// Flush all pending data and return the inner writer.
    pub fn finish(self) -> io::Result<W> {
        match self {
            OutputStream::Plain(mut inner) => {
                inner.flush()?;
                Ok(inner)
            }
            OutputStream::Gzip(encoder) => {
                let mut inner = encoder.finish()?;
                inner.flush()?;
                Ok(inner)
            }
        }
    }
}

impl<W: Write> Write for OutputStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::Plain(inner) => inner.write(buf),
            OutputStream::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::Plain(inner) => inner.flush(),
            OutputStream::Gzip(encoder) => encoder.flush(),
        }
    }
}
