use serde::{Deserialize, Serialize};

use crate::error::InitError;

// Flocking tunables. Uploaded once as a uniform and never changed at runtime.
// This should match the SimParams struct in compute.wgsl.
#[repr(C)]
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct SimParams {
    pub delta_t: f32,
    pub rule1_distance: f32,
    pub rule2_distance: f32,
    pub rule3_distance: f32,
    pub rule1_scale: f32,
    pub rule2_scale: f32,
    pub rule3_scale: f32,
}
const _: () = assert!(std::mem::size_of::<SimParams>() == 7 * 4);

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            delta_t: 0.04,
            rule1_distance: 0.1,
            rule2_distance: 0.025,
            rule3_distance: 0.025,
            rule1_scale: 0.02,
            rule2_scale: 0.05,
            rule3_scale: 0.005,
        }
    }
}

impl SimParams {
    pub fn validate(&self) -> Result<(), InitError> {
        if !(self.delta_t.is_finite() && self.delta_t > 0.0) {
            return Err(InitError::InvalidConfig(format!(
                "delta_t must be positive, got {}",
                self.delta_t
            )));
        }
        let tunables = [
            ("rule1_distance", self.rule1_distance),
            ("rule2_distance", self.rule2_distance),
            ("rule3_distance", self.rule3_distance),
            ("rule1_scale", self.rule1_scale),
            ("rule2_scale", self.rule2_scale),
            ("rule3_scale", self.rule3_scale),
        ];
        for (name, value) in tunables.iter() {
            if !(value.is_finite() && *value >= 0.0) {
                return Err(InitError::InvalidConfig(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

// Parameters that define a run. These don't change at runtime.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BoidsConfig {
    pub num_particles: u32,
    pub seed: u64,
    pub fps: f64,
    pub force_fallback_adapter: bool,
    // Block on GPU completion of each frame before starting the next one.
    pub wait_for_gpu: bool,
    pub window_width: u32,
    pub window_height: u32,

    #[serde(default)]
    pub sim_params: SimParams,
}

impl Default for BoidsConfig {
    fn default() -> Self {
        BoidsConfig {
            num_particles: 1500,
            seed: 42,
            fps: 60.0,
            force_fallback_adapter: false,
            wait_for_gpu: false,
            window_width: 640,
            window_height: 480,
            sim_params: SimParams::default(),
        }
    }
}

impl BoidsConfig {
    pub fn validate(&self) -> Result<(), InitError> {
        if self.num_particles == 0 {
            return Err(InitError::EmptySimulation);
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(InitError::InvalidConfig(format!(
                "fps must be positive, got {}",
                self.fps
            )));
        }
        self.sim_params.validate()
    }
}

impl std::str::FromStr for BoidsConfig {
    type Err = toml::de::Error;
    fn from_str(serialized: &str) -> Result<Self, Self::Err> {
        let config = toml::from_str(serialized)?;
        Ok(config)
    }
}

pub fn read_config_from_file(path: &str) -> anyhow::Result<BoidsConfig> {
    let config = std::fs::read_to_string(path)?.parse()?;
    Ok(config)
}

// Falls back to the defaults when the file is missing or malformed.
pub fn get_config(path: &str) -> BoidsConfig {
    match read_config_from_file(path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to parse config file({}): {:?}", path, e);
            BoidsConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke() {
        let config = BoidsConfig {
            num_particles: 256,
            seed: 7,
            wait_for_gpu: true,
            ..BoidsConfig::default()
        };
        let serialized = toml::to_string(&config).unwrap();
        println!("serialized = {}", serialized);
        let deserialized: BoidsConfig = serialized.parse().unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn sim_params_default_when_missing() {
        let serialized = r#"
            num_particles = 10
            seed = 1
            fps = 30.0
            force_fallback_adapter = false
            wait_for_gpu = false
            window_width = 100
            window_height = 100
        "#;
        let config: BoidsConfig = serialized.parse().unwrap();
        assert_eq!(config.num_particles, 10);
        assert_eq!(config.sim_params, SimParams::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = get_config("definitely/not/a/config.toml");
        assert_eq!(config, BoidsConfig::default());
    }

    #[test]
    fn uniform_layout_is_seven_floats() {
        let params = SimParams::default();
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&params));
        assert_eq!(floats, &[0.04, 0.1, 0.025, 0.025, 0.02, 0.05, 0.005]);
    }

    #[test]
    fn rejects_bad_values() {
        let empty = BoidsConfig {
            num_particles: 0,
            ..BoidsConfig::default()
        };
        assert!(matches!(empty.validate(), Err(InitError::EmptySimulation)));

        let negative = SimParams {
            rule2_scale: -1.0,
            ..SimParams::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(InitError::InvalidConfig(_))
        ));

        let frozen = SimParams {
            delta_t: 0.0,
            ..SimParams::default()
        };
        assert!(frozen.validate().is_err());
        assert!(BoidsConfig::default().validate().is_ok());
    }
}
