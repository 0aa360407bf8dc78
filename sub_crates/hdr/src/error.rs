#[derive(Debug)]
#[non_exhaustive]
pub enum ReadError {
    IO(std::io::Error),
    UnknownFormat,
    BadHeader,
    BadScanline,
    UnsupportedFeature,
    TooLarge,
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::IO(ref e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::IO(e) => e.fmt(f),
            ReadError::UnknownFormat => write!(f, "UnknownFormat: not a Radiance .hdr file."),
            ReadError::BadHeader => write!(f, "BadHeader: the .hdr header is malformed."),
            ReadError::BadScanline => write!(f, "BadScanline: a run-length encoded scanline is corrupt."),
            ReadError::UnsupportedFeature => write!(f, "UnsupportedFeature: the .hdr file uses a pixel format or orientation that isn't supported."),
            ReadError::TooLarge => write!(f, "TooLarge: the .hdr header claims more pixels than can be read."),
        }
    }
}

impl From<std::io::Error> for ReadError {
    fn from(other: std::io::Error) -> Self {
        ReadError::IO(other)
    }
}
