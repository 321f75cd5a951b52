pub mod compute_stage;
pub mod error;
pub mod fps_estimator;
pub mod frame_driver;
pub mod particle;
pub mod particle_store;
pub mod provider;
pub mod render_stage;
pub mod shader_utils;
pub mod sim_params;
pub mod software_provider;
pub mod wgpu_provider;

pub use error::{FrameError, InitError, ProviderError, SurfaceError};
pub use frame_driver::{FrameDriver, FrameOutcome, FrameStats};
pub use sim_params::{BoidsConfig, SimParams};
