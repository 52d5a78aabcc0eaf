//! Tool contract and registration
//!
//! Tools are the capabilities agents invoke. This module defines:
//! - The uniform async [`Tool`] contract and [`FnTool`] closure adapter
//! - The [`ToolError`] taxonomy tools report failures with
//! - The [`ToolRegistry`] pairing each tool with its declared capabilities
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_core::tools::{FnTool, ToolMetadata};
//!
//! let tool = FnTool::new(ToolMetadata::new("echo", "Echoes its input"), |input| async move {
//!     Ok(input)
//! });
//! ```

mod registry;
mod result;
mod tool;

pub use registry::{ToolRegistry, ToolSummary};
pub use result::{ToolError, ToolErrorKind};
pub use tool::{BoxedTool, FnTool, Tool, ToolMetadata};
