use thiserror::Error;

/// Errors raised while decoding a download file. Every decoder recovers from
/// these locally (skipping the record or marking the part invalid); only
/// [`DecodeError::Empty`] short-circuits a whole parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input is empty")]
    Empty,

    #[error("needed {needed} byte(s) at offset {offset}, {remaining} remaining")]
    Exhausted {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("seek to {offset} outside buffer of {len} byte(s)")]
    SeekOutOfRange { offset: usize, len: usize },

    #[error("structure mismatch: {0}")]
    Structure(String),

    #[error("unknown tag 0x{0:04X}")]
    UnknownTag(u16),

    #[error("value out of range: {0}")]
    ValueOutOfRange(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

impl DecodeError {
    pub fn structure(msg: impl Into<String>) -> Self {
        DecodeError::Structure(msg.into())
    }
}

/// Outcome of the Gen1 certificate chain verification (card files only).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CertificateError {
    #[error("Certificate data truncated")]
    DataTruncated,

    #[error("CA certificate invalid")]
    CaCertificateInvalid,

    #[error("Member state key invalid")]
    MemberKeyInvalid,

    #[error("Card certificate invalid")]
    CardCertificateInvalid,
}
