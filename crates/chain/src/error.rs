use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of data: needed {needed} bytes at offset {offset}")]
    UnexpectedEnd { offset: usize, needed: usize },
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),
    #[error("length {0} exceeds remaining data")]
    LengthOverflow(u64),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address mixes upper and lower case")]
    MixedCase,
    #[error("invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("checksum mismatch")]
    Checksum,
    #[error("unsupported version byte {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("invalid payload length {0}")]
    InvalidLength(usize),
    #[error("invalid padding")]
    InvalidPadding,
}
