//! Sensor sampling routine.
//!
//! Owns the sensor, brings it up, and keeps [`SharedEnvironment`] filled with
//! the latest good reading. Read failures are logged and otherwise ignored:
//! the previous values stay in place and nothing reaches the session side.

use crate::clock::Clock;
use crate::config::TimingConfig;
use crate::model::Reading;
use crate::retry::RetryPolicy;
use crate::sensor::{Sensor, SensorError};
use crate::state::SharedEnvironment;
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that stop the sampling routine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplerError {
    /// The sensor never came up within a bounded init policy.
    #[error("sensor initialization gave up after {attempts} attempts")]
    InitExhausted { attempts: u32 },
}

/// Periodic sampler writing into the shared environment state.
pub struct SensorSampler<S> {
    sensor: S,
    env: SharedEnvironment,
    init_policy: RetryPolicy,
    warmup: Duration,
    period: Duration,
}

impl<S: Sensor> SensorSampler<S> {
    /// Sampler with unbounded init retries and the given timings.
    pub fn new(sensor: S, env: SharedEnvironment, timing: &TimingConfig) -> Self {
        Self {
            sensor,
            env,
            init_policy: RetryPolicy::unbounded(timing.sensor_retry()),
            warmup: timing.sensor_warmup(),
            period: timing.sample_period(),
        }
    }

    /// Replace the init retry policy.
    pub fn with_init_policy(mut self, policy: RetryPolicy) -> Self {
        self.init_policy = policy;
        self
    }

    /// Bring the sensor up, then wait out the warm-up interval.
    ///
    /// With the default unbounded policy this only returns once the sensor
    /// answers.
    pub fn initialize<C: Clock + ?Sized>(&mut self, clock: &C) -> Result<u32, SamplerError> {
        let sensor = &mut self.sensor;
        let attempts = self.init_policy.run(clock, |attempt| {
            if sensor.begin() {
                return true;
            }
            warn!(attempt, "sensor not connected, retrying");
            false
        });

        match attempts {
            Some(attempts) => {
                info!(attempts, warmup = ?self.warmup, "sensor initialized");
                clock.sleep(self.warmup);
                Ok(attempts)
            }
            None => Err(SamplerError::InitExhausted {
                attempts: self.init_policy.max_attempts.unwrap_or_default(),
            }),
        }
    }

    /// Take one reading and publish it into the shared state.
    ///
    /// On failure the shared state is left as it was.
    pub fn sample_once(&mut self) -> Result<Reading, SensorError> {
        match self.sensor.read() {
            Ok(reading) => {
                self.env.store(reading);
                debug!(
                    temperature = reading.temperature,
                    humidity = reading.humidity,
                    "sensor reading"
                );
                Ok(reading)
            }
            Err(e) => {
                warn!(code = e.code(), "failed to read sensor: {}", e);
                Err(e)
            }
        }
    }

    /// One steady-state iteration: sample, then wait one period.
    pub fn step<C: Clock + ?Sized>(&mut self, clock: &C) {
        let _ = self.sample_once();
        clock.sleep(self.period);
    }

    /// Initialize, then sample forever.
    ///
    /// Only returns if a bounded init policy is exhausted.
    pub fn run<C: Clock + ?Sized>(&mut self, clock: &C) -> Result<Infallible, SamplerError> {
        self.initialize(clock)?;
        loop {
            self.step(clock);
        }
    }

    /// Handle to the state this sampler writes.
    pub fn environment(&self) -> &SharedEnvironment {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Environment;
    use crate::testing::{ManualClock, MockSensor};
    use pretty_assertions::assert_eq;

    fn sampler(sensor: MockSensor) -> SensorSampler<MockSensor> {
        SensorSampler::new(sensor, SharedEnvironment::new(), &TimingConfig::default())
    }

    #[test]
    fn test_init_retries_until_sensor_answers() {
        let sensor = MockSensor::new().with_begin_failures(3);
        let clock = ManualClock::new();
        let mut sampler = sampler(sensor);

        let attempts = sampler.initialize(&clock).unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn test_bounded_init_gives_up() {
        let sensor = MockSensor::new().with_begin_failures(10);
        let clock = ManualClock::new();
        let mut sampler =
            sampler(sensor).with_init_policy(RetryPolicy::bounded(Duration::from_secs(2), 3));

        assert_eq!(
            sampler.initialize(&clock),
            Err(SamplerError::InitExhausted { attempts: 3 })
        );
        // No warm-up after a failed init
        assert_eq!(clock.total_slept(), Duration::from_secs(4));
    }

    #[test]
    fn test_state_tracks_last_successful_read() {
        let sensor = MockSensor::new()
            .then_read(Ok(Reading::new(21.0, 50.0)))
            .then_read(Err(SensorError::Status(-2)))
            .then_read(Ok(Reading::new(22.5, 55.5)))
            .then_read(Err(SensorError::Status(-3)))
            .then_read(Err(SensorError::NotConnected));
        let clock = ManualClock::new();
        let mut sampler = sampler(sensor);
        let env = sampler.environment().clone();

        for _ in 0..5 {
            sampler.step(&clock);
        }

        assert_eq!(
            env.snapshot(),
            Environment {
                temperature: 22.5,
                humidity: 55.5
            }
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 5]);
    }

    #[test]
    fn test_failures_only_keep_zero_default() {
        let sensor = MockSensor::new()
            .then_read(Err(SensorError::Status(-1)))
            .then_read(Err(SensorError::Bus("nack".to_string())));
        let mut sampler = sampler(sensor);
        let env = sampler.environment().clone();

        assert!(sampler.sample_once().is_err());
        assert!(sampler.sample_once().is_err());

        assert_eq!(env.snapshot(), Environment::default());
    }

    #[test]
    fn test_failed_read_does_not_touch_state() {
        let sensor = MockSensor::new()
            .then_read(Ok(Reading::new(23.5, 60.2)))
            .then_read(Err(SensorError::Status(-4)));
        let mut sampler = sampler(sensor);
        let env = sampler.environment().clone();

        sampler.sample_once().unwrap();
        let before = env.snapshot();
        let err = sampler.sample_once().unwrap_err();

        assert_eq!(err.code(), -4);
        assert_eq!(env.snapshot(), before);
    }
}
