mod backend;
mod backends;
mod registry;

pub use backend::{
    is_cancelled, DetectionCancelled, DetectorBackend, DetectorSettings, DEFAULT_MAX_OBJECT_SIZE,
    DEFAULT_MIN_OBJECT_SIZE,
};
pub use backends::{LumaBlobBackend, ScriptedBackend, ScriptedResponse, DEFAULT_LUMA_THRESHOLD};
pub use registry::BackendRegistry;
