use std::sync::Arc;

use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};

use boids::wgpu_provider::{WgpuContext, WgpuOptions};
use boids::{BoidsConfig, FrameDriver, FrameError};

// "Framework" for the windowed executable: owns the window and event loop,
// and hands the GPU context to the frame driver on every redraw.
pub fn run(
    title: &str,
    config: &BoidsConfig,
    options: WgpuOptions,
    max_frames: u64,
) -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    log::info!("Initializing the window...");

    let window = Arc::new(
        winit::window::WindowBuilder::new()
            .with_title(title)
            .with_inner_size(winit::dpi::LogicalSize::new(
                config.window_width,
                config.window_height,
            ))
            .build(&event_loop)?,
    );
    let size = window.inner_size();

    let mut context = futures::executor::block_on(WgpuContext::new(
        window.clone(),
        (size.width, size.height),
        options,
    ))?;

    log::info!("Initializing the simulation...");
    let mut driver = FrameDriver::init(&mut context, config)?;
    let mut failure: Option<FrameError> = None;

    log::info!("Entering render loop...");
    event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::Resized(size) => {
                    driver.resize(&mut context, size.width, size.height);
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key: Key::Named(NamedKey::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                }
                | WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::RedrawRequested => match driver.tick(&mut context) {
                    Ok(_) => {
                        if max_frames > 0 && driver.frame() >= max_frames {
                            elwt.exit();
                        }
                    }
                    Err(e) => {
                        failure = Some(e);
                        elwt.exit();
                    }
                },
                _ => (),
            },
            Event::AboutToWait => window.request_redraw(),
            _ => (),
        }
    })?;

    // Simulation resources go first, then the device and surface.
    let stats = driver.shutdown();
    log::info!("Frame stats: {:?}", stats);
    drop(context);

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
