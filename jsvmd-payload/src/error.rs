use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("empty payload")]
    Empty,

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("zlib decompression failed: {0}")]
    Zlib(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
