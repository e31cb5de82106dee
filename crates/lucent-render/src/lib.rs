//! Scene resource management for the Lucent engine.
//!
//! This crate provides:
//! - Mesh and object types with packed-buffer offset assignment
//! - Shared scene buffer allocation over the GPU registry
//! - Staged texture uploads
//! - Depth target management
//! - Screenshot capture utilities
//! - Runtime shader compilation with an on-disk cache

pub mod layout;
pub mod mesh;
pub mod object;
pub mod scene;
pub mod screenshot;
pub mod shader_cache;
pub mod targets;
pub mod texture;

pub use layout::{PackedLayout, Region};
pub use mesh::{Mesh, Vertex};
pub use object::{MaterialData, ModelUniform, Object, ObjectOffsets};
pub use scene::{allocate_models_buffers, update_object_material, update_object_uniform};
pub use screenshot::{parse_frame_indices, save_screenshot, ScreenshotConfig, ScreenshotError};
pub use shader_cache::{load_shader, ShaderError, ShaderStage};
pub use targets::DepthTarget;
pub use texture::{allocate_texture, Texture};
