//! Opening import sources: transparent decompression and BOM stripping.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Transport compression, chosen from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("gz") | Some("gzip") => Self::Gzip,
            Some("zst") | Some("zstd") => Self::Zstd,
            _ => Self::None,
        }
    }
}

/// Open `path` as a decoded byte stream with any leading BOM removed.
pub fn open_source(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    let compression = Compression::from_path(path);
    tracing::debug!(path = %path.display(), ?compression, "Opening import source");

    let decoded: Box<dyn Read + Send> = match compression {
        Compression::None => Box::new(BufReader::new(file)),
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(BufReader::new(file))),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(file)?),
    };
    strip_bom(decoded)
}

/// Drop a UTF-8 byte-order mark from the front of `reader`, if present.
pub fn strip_bom<R: Read + Send + 'static>(mut reader: R) -> io::Result<Box<dyn Read + Send>> {
    let mut head = [0u8; 3];
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let keep = if head[..filled] == UTF8_BOM[..] { 0 } else { filled };
    Ok(Box::new(Cursor::new(head[..keep].to_vec()).chain(reader)))
}
