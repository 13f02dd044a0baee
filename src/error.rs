use thiserror::Error;

/// Failures the render loop catches and turns into a diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VisualizerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("permission to capture from '{device}' was denied")]
    PermissionDenied { device: String },

    #[error("capture device '{device}' is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("drawing surface is not ready")]
    SurfaceUnavailable,

    #[error("{style} renderer failed: {reason}")]
    TransformFault { style: &'static str, reason: String },
}

impl VisualizerError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn unavailable(device: &str, reason: impl ToString) -> Self {
        Self::DeviceUnavailable {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }
}
