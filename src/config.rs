use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::detect::{ScriptedBackend, SubprocessConfig};
use crate::gesture::{Calibration, ExtractionStrategy, GestureProcessor};
use crate::ingest::V4l2Config;
use crate::pipeline::{PipelineSettings, DEFAULT_MAX_HANDS, DEFAULT_WARMUP_ATTEMPTS};
use crate::transport::{
    parse_osc_target, AddressScheme, DEFAULT_ADDRESS_PREFIX, DEFAULT_OSC_TARGET,
};

const DEFAULT_DEVICE: &str = "stub://hands";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_WARMUP_DELAY_MS: u64 = 50;
const DEFAULT_DETECTOR: &str = "scripted";
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

pub const DETECTOR_SCRIPTED: &str = "scripted";
pub const DETECTOR_SUBPROCESS: &str = "subprocess";

#[derive(Debug, Deserialize, Default)]
struct HandOscConfigFile {
    camera: Option<CameraConfigFile>,
    osc: Option<OscConfigFile>,
    gesture: Option<GestureConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    warmup_attempts: Option<u32>,
    warmup_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OscConfigFile {
    target: Option<String>,
    prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GestureConfigFile {
    strategy: Option<ExtractionStrategy>,
    calibration: Option<CalibrationConfigFile>,
    max_hands: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CalibrationConfigFile {
    low: Option<f32>,
    high: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    command: Option<String>,
    args: Option<Vec<String>>,
    min_confidence: Option<f32>,
    jitter: Option<f32>,
    seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct HandOscConfig {
    pub camera: CameraSettings,
    pub osc: OscSettings,
    pub gesture: GestureSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Device opened at startup.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub warmup_attempts: u32,
    pub warmup_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct OscSettings {
    pub target: String,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct GestureSettings {
    pub strategy: ExtractionStrategy,
    pub calibration: Calibration,
    pub max_hands: usize,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub min_confidence: f32,
    /// Uniform noise added to scripted landmarks; 0 disables it.
    pub jitter: f32,
    pub seed: u64,
}

impl HandOscConfig {
    /// Defaults, overlaid with the file named by `HAND_OSC_CONFIG`, then the
    /// `HAND_OSC_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HAND_OSC_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: HandOscConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let osc = file.osc.unwrap_or_default();
        let gesture = file.gesture.unwrap_or_default();
        let calibration = gesture.calibration.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let defaults = Calibration::default();

        Self {
            camera: CameraSettings {
                device: camera.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                warmup_attempts: camera.warmup_attempts.unwrap_or(DEFAULT_WARMUP_ATTEMPTS),
                warmup_delay: Duration::from_millis(
                    camera.warmup_delay_ms.unwrap_or(DEFAULT_WARMUP_DELAY_MS),
                ),
            },
            osc: OscSettings {
                target: osc.target.unwrap_or_else(|| DEFAULT_OSC_TARGET.to_string()),
                prefix: osc
                    .prefix
                    .unwrap_or_else(|| DEFAULT_ADDRESS_PREFIX.to_string()),
            },
            gesture: GestureSettings {
                strategy: gesture.strategy.unwrap_or_default(),
                calibration: Calibration {
                    low: calibration.low.unwrap_or(defaults.low),
                    high: calibration.high.unwrap_or(defaults.high),
                },
                max_hands: gesture.max_hands.unwrap_or(DEFAULT_MAX_HANDS),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                command: detector.command,
                args: detector.args.unwrap_or_default(),
                min_confidence: detector.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
                jitter: detector.jitter.unwrap_or(0.0),
                seed: detector.seed.unwrap_or(0),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = non_empty_env("HAND_OSC_DEVICE") {
            self.camera.device = device;
        }
        if let Some(target) = non_empty_env("HAND_OSC_TARGET") {
            self.osc.target = target;
        }
        if let Some(strategy) = non_empty_env("HAND_OSC_STRATEGY") {
            self.gesture.strategy = strategy.parse()?;
        }
        if let Some(low) = non_empty_env("HAND_OSC_CALIBRATION_LOW") {
            self.gesture.calibration.low = low
                .trim()
                .parse()
                .map_err(|_| anyhow!("HAND_OSC_CALIBRATION_LOW must be a number"))?;
        }
        if let Some(high) = non_empty_env("HAND_OSC_CALIBRATION_HIGH") {
            self.gesture.calibration.high = high
                .trim()
                .parse()
                .map_err(|_| anyhow!("HAND_OSC_CALIBRATION_HIGH must be a number"))?;
        }
        if let Some(backend) = non_empty_env("HAND_OSC_DETECTOR") {
            self.detector.backend = backend;
        }
        Ok(())
    }

    /// Check invariants after overrides. The binary calls this again after
    /// applying command-line flags.
    pub fn validate(&mut self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.camera.warmup_attempts == 0 {
            return Err(anyhow!("camera warmup_attempts must be at least 1"));
        }
        parse_osc_target(&self.osc.target)?;
        if !self.osc.prefix.starts_with('/') {
            return Err(anyhow!("osc prefix must start with '/'"));
        }
        self.gesture.calibration.validate()?;
        if self.gesture.max_hands == 0 {
            return Err(anyhow!("gesture max_hands must be at least 1"));
        }

        self.detector.backend = self.detector.backend.trim().to_lowercase();
        match self.detector.backend.as_str() {
            DETECTOR_SCRIPTED => {}
            DETECTOR_SUBPROCESS => {
                if self
                    .detector
                    .command
                    .as_deref()
                    .map_or(true, |command| command.trim().is_empty())
                {
                    return Err(anyhow!("subprocess detector requires detector.command"));
                }
            }
            other => return Err(anyhow!("unknown detector backend: {}", other)),
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(anyhow!("detector min_confidence must be within 0..=1"));
        }
        if !self.detector.jitter.is_finite() || self.detector.jitter < 0.0 {
            return Err(anyhow!("detector jitter must be a non-negative number"));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            processor: GestureProcessor::new(self.gesture.strategy, self.gesture.calibration),
            addresses: AddressScheme::new(&self.osc.prefix),
            max_hands: self.gesture.max_hands,
            warmup_attempts: self.camera.warmup_attempts,
            warmup_delay: self.camera.warmup_delay,
        }
    }

    /// Size and rate template for every device the manager opens.
    pub fn camera_template(&self) -> V4l2Config {
        V4l2Config {
            device: self.camera.device.clone(),
            target_fps: self.camera.target_fps,
            width: self.camera.width,
            height: self.camera.height,
        }
    }

    /// The synthetic detector, with the configured landmark jitter.
    pub fn scripted_backend(&self) -> ScriptedBackend {
        ScriptedBackend::synthetic().with_jitter(self.detector.jitter, self.detector.seed)
    }

    /// Helper process settings, when the subprocess backend is selected.
    pub fn subprocess_config(&self) -> Option<SubprocessConfig> {
        if self.detector.backend != DETECTOR_SUBPROCESS {
            return None;
        }
        Some(SubprocessConfig {
            command: self.detector.command.clone()?,
            args: self.detector.args.clone(),
            min_confidence: self.detector.min_confidence,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<HandOscConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
