use boids::frame_driver::FrameState;
use boids::particle::{flock_step, Particle};
use boids::particle_store::{current_render_buffer, initial_particles};
use boids::provider::GpuProvider;
use boids::software_provider::SoftwareProvider;
use boids::{BoidsConfig, FrameDriver, FrameError, FrameOutcome, InitError, ProviderError, SurfaceError};

fn config(num_particles: u32, seed: u64) -> BoidsConfig {
    BoidsConfig {
        num_particles,
        seed,
        ..BoidsConfig::default()
    }
}

// Runs the same number of steps entirely on the CPU.
fn cpu_reference(config: &BoidsConfig, steps: u64) -> Vec<Particle> {
    let mut src = initial_particles(config.num_particles, config.seed);
    let mut dst = vec![Particle::default(); src.len()];
    for _ in 0..steps {
        flock_step(&config.sim_params, &src, &mut dst);
        std::mem::swap(&mut src, &mut dst);
    }
    src
}

#[test]
fn hundred_frames_match_cpu_reference() {
    let config = config(200, 7);
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config).unwrap();

    let stats = driver.run(&mut provider, 100).unwrap();
    assert_eq!(driver.frame(), 100);
    assert_eq!(driver.state(), FrameState::Idle);
    assert_eq!(stats.presented, 100);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.source_uses, [50, 50]);
    assert_eq!(provider.submitted(), 100);
    assert_eq!(provider.presented(), 100);

    let latest = driver.store().buffer(current_render_buffer(99)).read_particles();
    assert_eq!(latest, cpu_reference(&config, 100));
}

#[test]
fn buffers_alternate_roles_every_frame() {
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config(32, 1)).unwrap();
    let ids = [
        driver.store().buffer(0).id(),
        driver.store().buffer(1).id(),
    ];
    driver.run(&mut provider, 6).unwrap();

    for (frame, record) in provider.compute_log().iter().enumerate() {
        let parity = frame % 2;
        assert_eq!(record.batch, frame as u64);
        assert_eq!(record.src, ids[parity]);
        assert_eq!(record.dst, ids[1 - parity]);
    }
}

#[test]
fn render_reads_what_compute_just_wrote() {
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config(50, 3)).unwrap();
    driver.run(&mut provider, 10).unwrap();

    let compute_log = provider.compute_log();
    let render_log = provider.render_log();
    assert_eq!(compute_log.len(), 10);
    assert_eq!(render_log.len(), 10);
    for (frame, (compute, render)) in compute_log.iter().zip(render_log).enumerate() {
        assert_eq!(compute.batch, render.batch);
        assert_eq!(render.buffer, compute.dst);
        // Each buffer is written on every other frame.
        assert_eq!(render.generation, frame as u64 / 2 + 1);
        assert_eq!(render.instance_count, 50);
    }
}

#[test]
fn partial_last_group_is_still_simulated() {
    let config = config(130, 11);
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config).unwrap();
    assert_eq!(driver.work_groups(), 3);

    driver.run(&mut provider, 3).unwrap();
    assert!(provider
        .compute_log()
        .iter()
        .all(|record| record.work_groups == 3));
    let latest = driver.store().buffer(current_render_buffer(2)).read_particles();
    assert_eq!(latest, cpu_reference(&config, 3));
}

#[test]
fn single_group_boundary() {
    let mut provider = SoftwareProvider::new((640, 480));
    let driver = FrameDriver::init(&mut provider, &config(64, 0)).unwrap();
    assert_eq!(driver.work_groups(), 1);
    let driver_65 = FrameDriver::init(&mut provider, &config(65, 0)).unwrap();
    assert_eq!(driver_65.work_groups(), 2);
}

#[test]
fn initial_state_is_reproducible() {
    let mut provider = SoftwareProvider::new((640, 480));
    let first = FrameDriver::init(&mut provider, &config(100, 99)).unwrap();
    let second = FrameDriver::init(&mut provider, &config(100, 99)).unwrap();
    for index in 0..2 {
        assert_eq!(
            first.store().buffer(index).read_particles(),
            second.store().buffer(index).read_particles()
        );
    }
    assert_eq!(
        first.store().buffer(0).read_particles(),
        first.store().buffer(1).read_particles()
    );
}

#[test]
fn empty_simulation_is_rejected() {
    let mut provider = SoftwareProvider::new((640, 480));
    let result = FrameDriver::init(&mut provider, &config(0, 0));
    assert!(matches!(result, Err(InitError::EmptySimulation)));
    assert_eq!(provider.live_resources(), 0);
}

#[test]
fn transient_surface_errors_skip_frames() {
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config(20, 5)).unwrap();
    driver.tick(&mut provider).unwrap();
    provider.fail_acquisitions(vec![
        SurfaceError::Timeout,
        SurfaceError::Outdated,
        SurfaceError::Lost,
    ]);

    for expected in [SurfaceError::Timeout, SurfaceError::Outdated, SurfaceError::Lost] {
        assert_eq!(
            driver.tick(&mut provider).unwrap(),
            FrameOutcome::Skipped(expected)
        );
        assert_eq!(driver.frame(), 1);
    }
    assert_eq!(
        driver.tick(&mut provider).unwrap(),
        FrameOutcome::Presented { frame: 1 }
    );
    assert_eq!(driver.stats().skipped, 3);
    assert_eq!(driver.stats().presented, 2);
    assert_eq!(provider.submitted(), 2);
    // Only the outdated and lost surfaces were reconfigured.
    assert_eq!(provider.configured(), 2);
}

#[test]
fn outdated_surface_recovers_after_one_reconfigure() {
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config(20, 5)).unwrap();
    provider.fail_acquisitions(vec![SurfaceError::Outdated]);

    let stats = driver.run(&mut provider, 50).unwrap();
    assert_eq!(provider.configured(), 1);
    assert_eq!(provider.surface_size(), (640, 480));
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.presented, 49);
    assert_eq!(driver.frame(), 49);
}

#[test]
fn out_of_memory_surface_is_fatal() {
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config(20, 5)).unwrap();
    provider.fail_acquisitions(vec![SurfaceError::OutOfMemory]);
    let err = driver.tick(&mut provider).unwrap_err();
    assert!(matches!(err, FrameError::Surface(SurfaceError::OutOfMemory)));
    assert_eq!(driver.frame(), 0);
    assert!(provider.compute_log().is_empty());
}

#[test]
fn run_stops_at_first_fatal_error() {
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config(20, 5)).unwrap();
    driver.run(&mut provider, 4).unwrap();
    provider.fail_next_submit(ProviderError::Submit("device lost".into()));
    assert!(driver.run(&mut provider, 4).is_err());
    assert_eq!(driver.frame(), 4);
    assert_eq!(driver.stats().presented, 4);
}

#[test]
fn shutdown_releases_everything() {
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config(100, 2)).unwrap();
    assert!(provider.live_resources() > 0);
    driver.run(&mut provider, 5).unwrap();

    let stats = driver.shutdown();
    assert_eq!(stats.presented, 5);
    assert_eq!(provider.live_resources(), 0);
}

#[test]
fn failed_init_releases_partial_resources() {
    let mut provider = SoftwareProvider::new((640, 480));
    provider.fail_allocation_of("Vertex Buffer");
    let result = FrameDriver::init(&mut provider, &config(100, 2));
    assert!(matches!(
        result,
        Err(InitError::Provider(ProviderError::Allocation { .. }))
    ));
    assert!(provider.created_resources() > 0);
    assert_eq!(provider.live_resources(), 0);
}

#[test]
fn resize_reconfigures_surface() {
    let mut provider = SoftwareProvider::new((640, 480));
    let mut driver = FrameDriver::init(&mut provider, &config(10, 2)).unwrap();
    driver.resize(&mut provider, 1024, 768);
    driver.resize(&mut provider, 0, 768);
    assert_eq!(provider.surface_size(), (1024, 768));
    assert_eq!(provider.configured(), 1);
    assert!(matches!(
        driver.tick(&mut provider).unwrap(),
        FrameOutcome::Presented { frame: 0 }
    ));
}
