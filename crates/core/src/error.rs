/// A configuration value was present but could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unsupported {kind}: {value:?}")]
    Unsupported { kind: &'static str, value: String },
}
