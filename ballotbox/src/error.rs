use thiserror::Error;

/// Boxed error from a storage or ledger backend
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("ballotbox: key encryption secret is not configured")]
    MissingWrappingSecret,

    #[error("ballotbox: RSA error: {0}")]
    RSAError(#[from] rsa::errors::Error),

    #[error("ballotbox: PKCS8 error: {0}")]
    Pkcs8Error(#[from] rsa::pkcs8::Error),

    #[error("ballotbox: invalid public key: {0}")]
    InvalidPublicKey(#[from] rsa::pkcs8::spki::Error),

    #[error("ballotbox: invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("ballotbox: AES-GCM encryption failed")]
    EncryptionFailed,

    #[error("ballotbox: sealed private key could not be opened: {0}")]
    UnsealFailed(String),

    #[error("ballotbox: JSON error: {0}")]
    JSONSerialization(#[from] serde_json::Error),

    #[error("ballotbox: no active key pair for label \"{0}\"")]
    NoActiveKey(String),

    #[error("ballotbox: no decryption key available for label \"{0}\"")]
    NoDecryptionKey(String),

    #[error("ballotbox: invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("ballotbox: storage error: {0}")]
    Storage(#[source] BackendError),
}

impl Error {
    /// Wrap a storage backend error
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage(Box::new(err))
    }
}

/// Request validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{0} must be a positive integer")]
    InvalidIdentifier(&'static str),

    #[error("payload must include ciphertext, iv and wrappedKey")]
    IncompletePayload,
}

/// Decryption failure for a single encrypted vote
///
/// These never abort a tally, they are recorded against the offending row.
#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("invalid base64 in {field}: {source}")]
    Base64 {
        field: &'static str,
        source: base64::DecodeError,
    },

    #[error("failed to unwrap content key: {0}")]
    KeyUnwrap(#[from] rsa::errors::Error),

    #[error("unwrapped content key has {0} bytes, expected 32")]
    ContentKeyLength(usize),

    #[error("iv has {0} bytes, expected 12")]
    IvLength(usize),

    #[error("ciphertext too short to contain authentication tag")]
    CiphertextTooShort,

    #[error("authentication tag mismatch")]
    TagMismatch,

    #[error("malformed vote plaintext: {0}")]
    MalformedPlaintext(#[from] serde_json::Error),
}

/// Failure to evaluate the external admin predicate
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger transport error: {0}")]
    Transport(#[source] BackendError),

    #[error("ledger rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("ledger returned a malformed result: {0}")]
    MalformedResult(String),
}

/// Authorization gate outcome for a denied request
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("adminAddress is required")]
    MissingAddress,

    #[error("unauthorized: admin access required")]
    Unauthorized(String),

    #[error("failed to verify admin status: {0}")]
    CheckFailed(#[from] LedgerError),
}
