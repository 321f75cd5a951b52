use std::time::{Duration, Instant};

// Weight of the newest frame in the smoothed frame time.
const SMOOTHING: f64 = 0.1;

#[derive(Debug)]
pub struct FpsEstimator {
    iteration_start: Instant,
    pub iteration_duration: Duration,
    smoothed_frame_time: Option<f64>,
}

impl FpsEstimator {
    pub fn new(fps: f64) -> FpsEstimator {
        FpsEstimator {
            iteration_start: Instant::now(),
            iteration_duration: Duration::from_secs_f64(1.0 / fps),
            smoothed_frame_time: None,
        }
    }

    /// Marks the start of a new frame and returns the length of the last one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta_t = now - self.iteration_start;
        self.iteration_start = now;
        if delta_t > self.iteration_duration {
            log::debug!("Over time budget by: {:?}", delta_t - self.iteration_duration);
        }
        self.record(delta_t);
        delta_t
    }

    fn record(&mut self, delta_t: Duration) {
        let seconds = delta_t.as_secs_f64();
        self.smoothed_frame_time = Some(match self.smoothed_frame_time {
            Some(previous) => previous + SMOOTHING * (seconds - previous),
            None => seconds,
        });
    }

    pub fn fps(&self) -> f64 {
        match self.smoothed_frame_time {
            Some(t) if t > 0.0 => 1.0 / t,
            _ => 0.0,
        }
    }
}
