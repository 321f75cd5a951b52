//! Per-frame orchestration: one compute pass then one render pass per batch.
//!
//! Frames move strictly through Idle -> Encoding -> Submitted -> Idle. The
//! compute pass of frame `k` reads buffer `k % 2` and writes the other one,
//! the render pass of the same batch draws from the buffer just written, and
//! the counter only advances once the queue accepted the batch. A frame
//! never starts encoding while the previous one is still being recorded.

use std::time::{Duration, Instant};

use crate::compute_stage::ComputeStage;
use crate::error::{FrameError, InitError, SurfaceError};
use crate::fps_estimator::FpsEstimator;
use crate::particle_store::{source_index, ParticleStore};
use crate::provider::{GpuProvider, Submission};
use crate::render_stage::RenderStage;
use crate::sim_params::BoidsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Encoding,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Frame `frame` was submitted and presented.
    Presented { frame: u64 },
    /// The surface was temporarily unavailable; nothing was recorded.
    Skipped(SurfaceError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub skipped: u64,
    // How many frames used each buffer as the compute source.
    pub source_uses: [u64; 2],
}

pub struct FrameDriver<P: GpuProvider> {
    store: ParticleStore<P>,
    compute: ComputeStage<P>,
    render: RenderStage<P>,
    frame: u64,
    state: FrameState,
    stats: FrameStats,
    wait_for_gpu: bool,
    fps: FpsEstimator,
}

impl<P: GpuProvider> FrameDriver<P> {
    /// Builds every GPU resource the simulation needs. On failure, whatever
    /// was already created is released before returning.
    pub fn init(provider: &mut P, config: &BoidsConfig) -> Result<Self, InitError> {
        config.validate()?;
        let store = ParticleStore::init(provider, config.num_particles, config.seed)?;
        let compute = ComputeStage::init(provider, &store, &config.sim_params)?;
        let render = RenderStage::init(provider)?;
        Ok(FrameDriver {
            store,
            compute,
            render,
            frame: 0,
            state: FrameState::Idle,
            stats: FrameStats::default(),
            wait_for_gpu: config.wait_for_gpu,
            fps: FpsEstimator::new(config.fps),
        })
    }

    /// Number of frames submitted so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn store(&self) -> &ParticleStore<P> {
        &self.store
    }

    pub fn work_groups(&self) -> u32 {
        self.compute.work_groups()
    }

    /// Drives one frame. Transient surface failures skip the frame and are
    /// reported as [`FrameOutcome::Skipped`]; anything else is fatal.
    pub fn tick(&mut self, provider: &mut P) -> Result<FrameOutcome, FrameError> {
        let target = match provider.acquire_target() {
            Ok(target) => target,
            Err(e) if e.is_transient() => {
                log::warn!("Skipping frame {}: {}", self.frame, e);
                if e.needs_reconfigure() {
                    // Otherwise every later acquire fails the same way.
                    let (width, height) = provider.surface_size();
                    provider.configure_surface(width, height);
                }
                self.stats.skipped += 1;
                return Ok(FrameOutcome::Skipped(e));
            }
            Err(e) => {
                log::error!("Failed to acquire frame {}: {}", self.frame, e);
                return Err(FrameError::Surface(e));
            }
        };

        self.state = FrameState::Encoding;
        let cpu_time_start = Instant::now();
        let submission = match self.encode_and_submit(provider, &target) {
            Ok(submission) => submission,
            Err(e) => {
                log::error!("Failed to submit frame {}: {}", self.frame, e);
                self.state = FrameState::Idle;
                return Err(e);
            }
        };
        let cpu_time = cpu_time_start.elapsed();

        self.state = FrameState::Submitted;
        let frame = self.frame;
        self.stats.source_uses[source_index(frame)] += 1;
        self.frame += 1;
        provider.present(target);

        let gpu_time = if self.wait_for_gpu {
            let gpu_time_start = Instant::now();
            provider.wait(submission);
            gpu_time_start.elapsed()
        } else {
            Duration::default()
        };
        let frame_time = self.fps.tick();
        log::debug!(
            "Frame time: {:?}, GPU time: {:?}, CPU time: {:?}, FPS: {:.1}",
            frame_time,
            gpu_time,
            cpu_time,
            self.fps.fps()
        );

        self.state = FrameState::Idle;
        self.stats.presented += 1;
        Ok(FrameOutcome::Presented { frame })
    }

    fn encode_and_submit(
        &mut self,
        provider: &mut P,
        target: &P::Target,
    ) -> Result<Submission, FrameError> {
        let mut batch = provider.begin_batch()?;
        // Compute must be recorded first: the render pass reads what it writes.
        self.compute.record(provider, &mut batch, self.frame);
        self.render
            .record(provider, &mut batch, target, &self.store, self.frame);
        Ok(provider.submit(batch)?)
    }

    /// Drives up to `frames` ticks, stopping at the first fatal error.
    /// Skipped frames count towards the total.
    pub fn run(&mut self, provider: &mut P, frames: u64) -> Result<FrameStats, FrameError> {
        for _ in 0..frames {
            self.tick(provider)?;
        }
        Ok(self.stats.clone())
    }

    pub fn resize(&mut self, provider: &mut P, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to ({}, {})", width, height);
            return;
        }
        log::info!("Resizing to ({}, {})", width, height);
        provider.configure_surface(width, height);
    }

    /// Releases every resource the driver owns.
    pub fn shutdown(self) -> FrameStats {
        log::info!(
            "Shutting down after {} frames ({} skipped)",
            self.frame,
            self.stats.skipped
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software_provider::SoftwareProvider;

    fn config(num_particles: u32) -> BoidsConfig {
        BoidsConfig {
            num_particles,
            ..BoidsConfig::default()
        }
    }

    #[test]
    fn starts_idle_at_frame_zero() {
        let mut provider = SoftwareProvider::new((64, 64));
        let driver = FrameDriver::init(&mut provider, &config(100)).unwrap();
        assert_eq!(driver.frame(), 0);
        assert_eq!(driver.state(), FrameState::Idle);
        assert_eq!(driver.work_groups(), 2);
    }

    #[test]
    fn tick_records_compute_then_render() {
        let mut provider = SoftwareProvider::new((64, 64));
        let mut driver = FrameDriver::init(&mut provider, &config(10)).unwrap();
        let outcome = driver.tick(&mut provider).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented { frame: 0 });
        assert_eq!(driver.frame(), 1);
        assert_eq!(driver.state(), FrameState::Idle);

        let compute = &provider.compute_log()[0];
        let render = &provider.render_log()[0];
        assert_eq!(compute.batch, render.batch);
        assert_eq!(render.buffer, compute.dst);
        assert_ne!(render.buffer, compute.src);
        assert_eq!(render.generation, 1);
        assert_eq!(render.instance_count, 10);
        assert_eq!(render.vertex_count, 3);
        assert_eq!(render.load, crate::provider::LoadMode::Load);
        assert_eq!(provider.presented(), 1);
    }

    #[test]
    fn transient_failure_skips_without_advancing() {
        let mut provider = SoftwareProvider::new((64, 64));
        let mut driver = FrameDriver::init(&mut provider, &config(10)).unwrap();
        provider.fail_acquisitions(vec![SurfaceError::Outdated]);
        let outcome = driver.tick(&mut provider).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped(SurfaceError::Outdated));
        assert_eq!(driver.frame(), 0);
        assert_eq!(provider.submitted(), 0);
        assert_eq!(driver.stats().skipped, 1);
        assert_eq!(provider.configured(), 1);
        assert_eq!(provider.surface_size(), (64, 64));
        assert_eq!(
            driver.tick(&mut provider).unwrap(),
            FrameOutcome::Presented { frame: 0 }
        );
    }

    #[test]
    fn timeout_does_not_reconfigure() {
        let mut provider = SoftwareProvider::new((64, 64));
        let mut driver = FrameDriver::init(&mut provider, &config(10)).unwrap();
        provider.fail_acquisitions(vec![SurfaceError::Timeout]);
        driver.tick(&mut provider).unwrap();
        assert_eq!(provider.configured(), 0);
    }

    #[test]
    fn fatal_failure_keeps_counter() {
        let mut provider = SoftwareProvider::new((64, 64));
        let mut driver = FrameDriver::init(&mut provider, &config(10)).unwrap();
        driver.tick(&mut provider).unwrap();
        provider.fail_next_submit(crate::error::ProviderError::Submit("device lost".into()));
        let err = driver.tick(&mut provider).unwrap_err();
        assert!(matches!(err, FrameError::Provider(_)));
        assert_eq!(driver.frame(), 1);
        assert_eq!(driver.state(), FrameState::Idle);
        assert_eq!(provider.presented(), 1);
    }

    #[test]
    fn resize_ignores_minimized_window() {
        let mut provider = SoftwareProvider::new((64, 64));
        let mut driver = FrameDriver::init(&mut provider, &config(10)).unwrap();
        driver.resize(&mut provider, 0, 0);
        assert_eq!(provider.surface_size(), (64, 64));
        driver.resize(&mut provider, 800, 600);
        assert_eq!(provider.surface_size(), (800, 600));
    }
}
