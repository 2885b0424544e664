use std::{
    ffi::OsStr,
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    os::unix::ffi::OsStrExt,
    path::Path,
};

use flate2::read::MultiGzDecoder;

/// Compression of a rotated file, inferred from its name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    #[cfg(feature = "zstd")]
    Zstd,
}

/// Suffixes we know how to decompress, paired with their codec.
#[cfg(feature = "zstd")]
pub const SUFFIXES: &[(&str, Compression)] =
    &[(".gz", Compression::Gzip), (".zst", Compression::Zstd)];
#[cfg(not(feature = "zstd"))]
pub const SUFFIXES: &[(&str, Compression)] = &[(".gz", Compression::Gzip)];

impl Compression {
    pub fn from_name(name: &OsStr) -> Self {
        let name = name.as_bytes();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix.as_bytes()))
            .map(|&(_, compression)| compression)
            .unwrap_or(Compression::None)
    }

    pub fn from_path(path: &Path) -> Self {
        path.file_name()
            .map(Self::from_name)
            .unwrap_or(Compression::None)
    }

    pub fn is_compressed(self) -> bool {
        self != Compression::None
    }
}

/// Byte stream of a file's (decompressed) contents.
///
/// Offsets always refer to decompressed bytes, so a state recorded against a plain log stays valid after the
/// rotated copy gets compressed.
pub enum Source {
    Plain(File),
    Gzip(MultiGzDecoder<BufReader<File>>),
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::read::Decoder<'static, BufReader<File>>),
}

impl Source {
    /// Wrap an already opened file and position it at `offset`. Plain files are seeked, compressed ones have
    /// their first `offset` decompressed bytes discarded. An offset past the end yields an empty stream.
    pub fn new(mut file: File, compression: Compression, offset: u64) -> io::Result<Self> {
        let mut source = match compression {
            Compression::None => {
                file.seek(SeekFrom::Start(offset))?;
                return Ok(Source::Plain(file));
            }
            Compression::Gzip => Source::Gzip(MultiGzDecoder::new(BufReader::new(file))),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Source::Zstd(zstd::stream::read::Decoder::new(file)?),
        };
        io::copy(&mut (&mut source).take(offset), &mut io::sink())?;
        Ok(source)
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Plain(file) => file.read(buf),
            Source::Gzip(decoder) => decoder.read(buf),
            #[cfg(feature = "zstd")]
            Source::Zstd(decoder) => decoder.read(buf),
        }
    }
}

/// Open `path` for streaming from `offset`, decompressing according to its name.
pub fn open_at(path: impl AsRef<Path>, offset: u64) -> io::Result<Source> {
    let path = path.as_ref();
    let file = File::open(path)?;
    Source::new(file, Compression::from_path(path), offset)
}
