//! A lit sphere rendered with wgpu.
//!
//! Setup pushes a fixed camera, links a WGSL vertex/fragment pair and uploads
//! a UV sphere; every frame then clears, binds and draws through a narrow
//! render context interface. The interface has two implementations: a wgpu
//! backend driven by a winit window and a recording backend that runs the
//! same setup and frame step without a GPU.

pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod headless;
pub mod render;
pub mod shader;
pub mod window;

pub use app::SphereDemo;
pub use camera::CameraState;
pub use config::DemoConfig;
pub use error::{ContextError, MeshError, ShaderError};
pub use geometry::{uv_sphere, SphereGeometry, SphereParams};
pub use headless::run_headless;
pub use render::{FrameCommand, GpuContext, RecordingContext, RenderContext};
pub use shader::{EmbeddedShaders, IncludeResolver, ProgramSource, ShaderDir};
pub use window::{run_windowed, WindowInitError};
