//! 模拟数据源
//!
//! 无眼动仪硬件时使用：以固定频率生成沿圆周运动的凝视点，
//! 左右眼水平偏移 ±0.01，可按概率注入无效样本。

use std::f64::consts::TAU;
use std::time::Duration;

use contracts::{ContractError, EyeSample, Sample, SourceConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{derive_midpoint, ClockProbe, MonotonicClock, SampleSender, SampleSource, ScreenSize};

const EYE_OFFSET: f64 = 0.01;
const EYE_DISTANCE_MM: f32 = 600.0;

/// Circular-path gaze generator
pub struct SimulatedSource {
    name: String,
    config: SourceConfig,
    screen: ScreenSize,
    clock: MonotonicClock,
    probe: ClockProbe,
    rng: StdRng,
    max_samples: Option<u64>,
}

impl SimulatedSource {
    pub fn new(config: &SourceConfig) -> Self {
        let clock = MonotonicClock::new();
        let probe = ClockProbe::calibrate(&clock, ClockProbe::DEFAULT_PROBES);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            name: "simulated".to_string(),
            config: config.clone(),
            screen: ScreenSize::new(config.screen_width_px, config.screen_height_px),
            clock,
            probe,
            rng,
            max_samples: None,
        }
    }

    /// Stop on its own after `count` samples
    pub fn with_max_samples(mut self, count: u64) -> Self {
        self.max_samples = Some(count);
        self
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.frequency_hz)
    }

    /// Sample number `index` of the path
    fn sample_at(&mut self, index: u64) -> Sample {
        let t = index as f64 / self.config.frequency_hz;
        let device_timestamp_us = (t * 1_000_000.0).round() as i64;
        let system_timestamp_us = self.clock.now_us();
        let epoch_timestamp_ms = self.probe.to_utc_ms(system_timestamp_us);

        let invalid_probability = self.config.invalid_probability;
        let invalid = (0.0..=1.0).contains(&invalid_probability)
            && self.rng.random_bool(invalid_probability);

        let (left, right) = if invalid {
            (EyeSample::default(), EyeSample::default())
        } else {
            let angle = TAU * self.config.speed_rev_per_s * t;
            let (cx, cy) = self.config.center;
            let x = cx + self.config.radius * angle.cos();
            let y = cy + self.config.radius * angle.sin();
            (
                self.eye(x - EYE_OFFSET, y, -30.0),
                self.eye(x + EYE_OFFSET, y, 30.0),
            )
        };

        let (normalized, pixel) = derive_midpoint(&left, &right, self.screen);
        Sample::new(epoch_timestamp_ms, device_timestamp_us, system_timestamp_us)
            .with_eyes(left, right)
            .with_midpoint(normalized, pixel)
    }

    fn eye(&mut self, x: f64, y: f64, origin_x_mm: f32) -> EyeSample {
        let (x, y) = (x as f32, y as f32);
        EyeSample {
            gaze_x: Some(x),
            gaze_y: Some(y),
            pupil_mm: Some(3.0 + self.rng.random_range(-0.2..0.2)),
            gaze_point_3d: Some([(x - 0.5) * 530.0, (0.5 - y) * 300.0, 0.0]),
            origin_3d: Some([origin_x_mm, 0.0, EYE_DISTANCE_MM]),
        }
    }
}

impl SampleSource for SimulatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, out: SampleSender, stop: CancellationToken) -> Result<(), ContractError> {
        let mut ticker = tokio::time::interval(self.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            frequency_hz = self.config.frequency_hz,
            max_samples = ?self.max_samples,
            "simulated source running"
        );

        let mut index: u64 = 0;
        loop {
            if self.max_samples.is_some_and(|max| index >= max) {
                debug!(index, "simulated source exhausted");
                break;
            }

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sample = self.sample_at(index);
            trace!(index, device_ts = sample.device_timestamp_us, "sample generated");
            out.send(sample).await?;
            index += 1;
        }

        Ok(())
    }
}
