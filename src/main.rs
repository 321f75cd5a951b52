mod framework;

use boids::software_provider::SoftwareProvider;
use boids::wgpu_provider::WgpuOptions;
use boids::{BoidsConfig, FrameDriver};
use log::info;

gflags::define! {
    --config: &str = "boids_config.toml"
}
gflags::define! {
    --log_filter: &str = "warn,boids=info"
}
gflags::define! {
    /// Stop after this many frames; 0 runs until the window is closed.
    --frames: u64 = 0
}
gflags::define! {
    /// Run the simulation on the CPU without opening a window.
    --headless = false
}
gflags::define! {
    -h, --help = false
}

// Frames driven by a headless run when --frames is not given.
const DEFAULT_HEADLESS_FRAMES: u64 = 100;

// WGPU_LOG_LEVEL raises or lowers wgpu's own logging on top of --log_filter.
fn log_filter() -> String {
    let mut filter = LOG_FILTER.flag.to_string();
    if let Ok(level) = std::env::var("WGPU_LOG_LEVEL") {
        let level = level.to_lowercase();
        match level.as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {
                filter.push_str(&format!(",wgpu_core={},wgpu_hal={}", level, level));
            }
            _ => {}
        }
    }
    filter
}

fn run_headless(config: &BoidsConfig, frames: u64) -> anyhow::Result<()> {
    let frames = if frames == 0 {
        DEFAULT_HEADLESS_FRAMES
    } else {
        frames
    };
    let mut provider = SoftwareProvider::new((config.window_width, config.window_height));
    let mut driver = FrameDriver::init(&mut provider, config)?;
    let stats = driver.run(&mut provider, frames)?;
    info!("Headless run finished: {:?}", stats);
    driver.shutdown();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    gflags::parse();
    if HELP.flag {
        gflags::print_help_and_exit(0);
    }
    // The logger keeps its filter for the life of the process.
    let filter: &'static str = Box::leak(log_filter().into_boxed_str());
    scrub_log::init_with_filter_string(filter)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {:?}", e))?;

    let config = boids::sim_params::get_config(CONFIG.flag);
    info!("Running with {:?}", config);
    if HEADLESS.flag {
        return run_headless(&config, FRAMES.flag);
    }

    let options = WgpuOptions {
        force_fallback_adapter: config.force_fallback_adapter
            || std::env::var("WGPU_FORCE_FALLBACK_ADAPTER").as_deref() == Ok("1"),
    };
    framework::run("Boids", &config, options, FRAMES.flag)
}
