/// Result alias that carries the custom [`VizError`] type.
pub type Result<T> = std::result::Result<T, VizError>;

/// Common error type for the visualisation engine.
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    /// Free-form failure surfaced to the host diagnostics channel.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or preset files that fail to parse.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Index-addressed layer operation outside the current stack.
    #[error("layer index {index} out of range for {len} layer(s)")]
    LayerIndex { index: usize, len: usize },
    #[error("unknown visual style `{0}`")]
    UnknownStyle(String),
    #[error("invalid color `{0}`")]
    InvalidColor(String),
    /// The host surface is detached or has no drawable area.
    #[error("drawing surface unavailable")]
    SurfaceUnavailable,
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
}

impl VizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for VizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
