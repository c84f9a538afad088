//! Error types for the marshalling boundary

/// Result type for marshalling calls
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Coarse classification of a [`MarshalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Value present but with the wrong runtime representation
    TypeMismatch,
    /// Value present but not representable in the requested width
    ConversionFailure,
    /// Malformed native type declaration
    DescriptorParse,
    /// Internal type tables could not be extended
    RegistryExhaustion,
    /// A method table is already installed for the type
    AlreadyRegistered,
    /// The type has no known size
    IncompleteType,
    /// Error raised by the runtime or by a native function
    Runtime,
}

/// Errors raised by checked accessors and registration calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarshalError {
    /// Type mismatch during a checked access
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Numeric value not convertible to the requested integer
    #[error("{0}")]
    ConversionFailure(String),

    /// Type declaration does not parse
    #[error("declaration error: {0}")]
    DescriptorParse(String),

    /// Type tables are full; nothing was committed
    #[error("type registry exhausted: {0}")]
    RegistryExhaustion(String),

    /// A method table was already installed for this type
    #[error("method table already registered for '{0}'")]
    AlreadyRegistered(String),

    /// Attempt to allocate a type of unknown size
    #[error("size of C type is unknown or too large: '{0}'")]
    IncompleteType(String),

    /// Generic runtime error
    #[error("{0}")]
    Runtime(String),
}

impl MarshalError {
    /// Build a type mismatch error
    pub fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        MarshalError::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Build the integer conversion failure raised by the numeric codec
    pub fn not_integer(idx: i32) -> Self {
        MarshalError::ConversionFailure(format!(
            "bad argument #{}: not convertible to integer",
            idx
        ))
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarshalError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            MarshalError::ConversionFailure(_) => ErrorKind::ConversionFailure,
            MarshalError::DescriptorParse(_) => ErrorKind::DescriptorParse,
            MarshalError::RegistryExhaustion(_) => ErrorKind::RegistryExhaustion,
            MarshalError::AlreadyRegistered(_) => ErrorKind::AlreadyRegistered,
            MarshalError::IncompleteType(_) => ErrorKind::IncompleteType,
            MarshalError::Runtime(_) => ErrorKind::Runtime,
        }
    }

    /// Whether the caller can reasonably continue after this error.
    ///
    /// Only registry exhaustion is fatal.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::RegistryExhaustion
    }
}

impl From<String> for MarshalError {
    fn from(s: String) -> Self {
        MarshalError::Runtime(s)
    }
}

impl From<&str> for MarshalError {
    fn from(s: &str) -> Self {
        MarshalError::Runtime(s.to_string())
    }
}
