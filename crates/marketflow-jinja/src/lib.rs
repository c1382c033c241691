//! Query templates for transform steps
//!
//! This crate handles:
//! - Looking up SQL templates by transform name
//! - Rendering templates with static pipeline parameters
//! - Resolving `ref()` calls to transform output tables

pub mod store;
pub mod context;
pub mod functions;
pub mod renderer;

pub use store::{TemplateStore, FileTemplateStore, MemoryTemplateStore, TemplateError};
pub use context::{TemplateContext, TemplateContextBuilder};
pub use renderer::{QueryRenderer, RenderError};
