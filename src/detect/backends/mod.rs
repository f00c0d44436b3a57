pub mod luma;
pub mod scripted;

pub use luma::{LumaBlobBackend, DEFAULT_LUMA_THRESHOLD};
pub use scripted::{ScriptedBackend, ScriptedResponse};
