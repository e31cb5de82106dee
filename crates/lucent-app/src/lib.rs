//! Application framework for the Lucent engine.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate:
//! - Window creation and management
//! - GPU context initialization
//! - Swapchain creation and loss recovery
//! - Frame synchronization and submission
//! - Event loop handling
//!
//! # Example
//!
//! ```no_run
//! use lucent_app::{App, AppConfig, AppContext, FrameContext, run_app};
//!
//! struct MyApp;
//!
//! impl App for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn record(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;

pub use app::App;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use lucent_gpu::{GpuContext, GpuContextBuilder, RecoveryState};
pub use winit::event::WindowEvent;
