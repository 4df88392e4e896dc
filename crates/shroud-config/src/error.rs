//! Errors raised while loading, validating, or persisting `config.ron`.

/// A failure to read, parse, validate, or write the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read config.ron: {0}")]
    ReadError(#[source] std::io::Error),

    /// The directory or file could not be written.
    #[error("cannot write config.ron: {0}")]
    WriteError(#[source] std::io::Error),

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("config.ron is malformed: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// Serialising the current config failed.
    #[error("cannot serialise config: {0}")]
    SerializeError(#[source] ron::Error),

    /// A value parsed but is outside its allowed range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}
