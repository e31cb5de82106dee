//! Lucent Engine Demo Viewer
//!
//! Spins a small set of quads through the shared scene buffer and clears
//! the swapchain each frame, exercising the allocator, the resource
//! registry, and swapchain recovery.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lucent-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `-o, --output <PATTERN>`: Screenshot output pattern (use `{}` for frame number)
//! - `-f, --frames <FRAMES>`: Frame indices to capture (e.g., "0,10,20" or "0-5")
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use lucent_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(AppConfig::new("Lucent Engine - Viewer").with_size(WIDTH, HEIGHT))
}

fn print_help() {
    eprintln!(
        "Lucent Engine Demo Viewer

USAGE:
    cargo run -p lucent-viewer -- [OPTIONS]

OPTIONS:
    -o, --output <PATTERN>   Screenshot output pattern ({{}} = frame number)
    -f, --frames <FRAMES>    Frame indices to capture (e.g. \"0,10,20\" or \"0-5\")
    -h, --help               Print this help message"
    );
}
