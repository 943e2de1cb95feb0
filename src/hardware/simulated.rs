//! Simulated carousel rig.
//!
//! Models a bay rotating at a fixed speed so the controller can run end to
//! end without GPIO or I2C. A wall passes the ultrasonic sensor at the start
//! of every partition, and each partition carries metal with a configured
//! probability that is re-rolled every revolution. All detectors look at the
//! same point, so they agree on what is under the sensors.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{
    shared, ActuatorDriver, BinarySwitch, DistanceSensor, HardwareError, InitFailure,
    PyrometerChannel, Rig, ThermalArrayDriver, ThermalFrame,
};
use crate::config::defaults::{PARTITION_COUNT, THERMAL_HEIGHT, THERMAL_WIDTH};
use crate::config::{SimulationConfig, SorterConfig};

/// Fraction of a partition's arc during which its leading wall is in range.
const WALL_FRACTION: f64 = 0.1;

/// Portion of a partition's arc where its contents sit under the detectors.
const OBJECT_WINDOW: (f64, f64) = (0.3, 0.7);

/// Distance to the far side of an empty bay (m).
const OPEN_BAY_DISTANCE_M: f64 = 0.25;

const WALL_DISTANCE_M: f64 = 0.06;
const AMBIENT_C: f64 = 21.0;
const METAL_RISE_C: f64 = 3.0;

// ============================================================================
// Carousel Model
// ============================================================================

/// Where the carousel is at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarouselPosition {
    pub revolution: u64,
    pub partition: usize,
    /// Progress through the current partition's arc, in `0.0..1.0`.
    pub phase: f64,
}

#[derive(Debug, Clone)]
pub struct CarouselModel {
    origin: Instant,
    rpm: f64,
    metal_probability: f64,
    seed: u64,
}

impl CarouselModel {
    pub fn new(config: &SimulationConfig, origin: Instant) -> Self {
        Self {
            origin,
            rpm: config.rpm,
            metal_probability: config.metal_probability.clamp(0.0, 1.0),
            seed: config.seed,
        }
    }

    pub fn position_at(&self, at: Instant) -> CarouselPosition {
        let elapsed = at.saturating_duration_since(self.origin).as_secs_f64();
        let partitions = elapsed * self.rpm / 60.0 * PARTITION_COUNT as f64;
        let whole = partitions.floor() as u64;
        CarouselPosition {
            revolution: whole / PARTITION_COUNT as u64,
            partition: (whole % PARTITION_COUNT as u64) as usize,
            phase: partitions - partitions.floor(),
        }
    }

    /// Whether `partition` holds metal during `revolution`. Deterministic per seed.
    pub fn carries_metal(&self, revolution: u64, partition: usize) -> bool {
        let mixed = self.seed
            ^ revolution.wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (partition as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        StdRng::seed_from_u64(mixed).gen_bool(self.metal_probability)
    }

    pub fn wall_in_range(&self, at: Instant) -> bool {
        self.position_at(at).phase < WALL_FRACTION
    }

    pub fn metal_under_sensors(&self, at: Instant) -> bool {
        let pos = self.position_at(at);
        pos.phase >= OBJECT_WINDOW.0
            && pos.phase < OBJECT_WINDOW.1
            && self.carries_metal(pos.revolution, pos.partition)
    }
}

// ============================================================================
// Simulated Devices
// ============================================================================

pub struct SimulatedUltrasonic {
    model: Arc<CarouselModel>,
    jitter: StdRng,
}

impl DistanceSensor for SimulatedUltrasonic {
    fn read(&mut self) -> Result<f64, HardwareError> {
        let base = if self.model.wall_in_range(Instant::now()) {
            WALL_DISTANCE_M
        } else {
            OPEN_BAY_DISTANCE_M
        };
        Ok(base + self.jitter.gen_range(-0.002..0.002))
    }
}

pub struct SimulatedThermalArray {
    model: Arc<CarouselModel>,
    noise: StdRng,
}

impl ThermalArrayDriver for SimulatedThermalArray {
    fn capture_frame(&mut self) -> Result<ThermalFrame, HardwareError> {
        let mut frame = ThermalFrame::filled(AMBIENT_C);
        for row in 0..THERMAL_HEIGHT {
            for col in 0..THERMAL_WIDTH {
                frame.set(row, col, AMBIENT_C + self.noise.gen_range(-0.1..0.1));
            }
        }
        if self.model.metal_under_sensors(Instant::now()) {
            // 5x5 hot spot in the middle of the frame
            let (r0, c0) = (THERMAL_HEIGHT / 2 - 2, THERMAL_WIDTH / 2 - 2);
            for row in r0..r0 + 5 {
                for col in c0..c0 + 5 {
                    frame.set(row, col, AMBIENT_C + METAL_RISE_C);
                }
            }
        }
        Ok(frame)
    }
}

pub struct SimulatedPyrometer {
    model: Arc<CarouselModel>,
    channel: u8,
    failed: bool,
}

impl PyrometerChannel for SimulatedPyrometer {
    fn read_object_temperature(&mut self) -> Result<f64, HardwareError> {
        if self.failed {
            return Err(HardwareError::read_failed(
                format!("pyrometer ch{}", self.channel),
                "no acknowledge on multiplexer channel",
            ));
        }
        let rise = if self.model.metal_under_sensors(Instant::now()) {
            METAL_RISE_C
        } else {
            0.0
        };
        Ok(AMBIENT_C + rise)
    }
}

pub struct SimulatedSwitch {
    model: Arc<CarouselModel>,
}

impl BinarySwitch for SimulatedSwitch {
    fn read(&mut self) -> Result<bool, HardwareError> {
        Ok(self.model.metal_under_sensors(Instant::now()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drive {
    Forward,
    Backward,
}

/// Logs motor commands instead of driving GPIO.
pub struct SimulatedActuator {
    forward_pin: u8,
    backward_pin: u8,
    energised: Option<Drive>,
}

impl ActuatorDriver for SimulatedActuator {
    fn forward(&mut self) -> Result<(), HardwareError> {
        info!(pin = self.forward_pin, "[SimActuator] Forward (door opening)");
        self.energised = Some(Drive::Forward);
        Ok(())
    }

    fn backward(&mut self) -> Result<(), HardwareError> {
        info!(pin = self.backward_pin, "[SimActuator] Backward (door closing)");
        self.energised = Some(Drive::Backward);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        if let Some(drive) = self.energised.take() {
            debug!(?drive, "[SimActuator] Stop");
        }
        Ok(())
    }
}

// ============================================================================
// Rig Construction
// ============================================================================

/// Build a simulated rig wired as `config` describes.
///
/// Fails with [`InitFailure::AddressConflict`] when two devices share a GPIO pin.
pub fn build_rig(config: &SorterConfig) -> Result<Rig, HardwareError> {
    let mut claimed: HashMap<u8, String> = HashMap::new();
    for (pin, owner) in config.gpio_assignments() {
        if let Some(previous) = claimed.insert(pin, owner.clone()) {
            return Err(HardwareError::init(
                format!("gpio{pin} ({previous} / {owner})"),
                InitFailure::AddressConflict,
            ));
        }
    }

    let model = Arc::new(CarouselModel::new(&config.simulation, Instant::now()));
    let seed = config.simulation.seed;

    let thermal = config.thermal.enabled.then(|| {
        shared(SimulatedThermalArray {
            model: Arc::clone(&model),
            noise: StdRng::seed_from_u64(seed.wrapping_add(1)),
        }) as super::Shared<dyn ThermalArrayDriver>
    });

    let pyrometers = if config.pyrometer.enabled {
        (0..config.pyrometer.channels)
            .map(|ch| {
                let channel = u8::try_from(ch).unwrap_or(u8::MAX);
                Some(shared(SimulatedPyrometer {
                    model: Arc::clone(&model),
                    channel,
                    failed: config.simulation.failed_pyrometer_channels.contains(&channel),
                }) as super::Shared<dyn PyrometerChannel>)
            })
            .collect()
    } else {
        Vec::new()
    };

    let switches = if config.proximity.enabled {
        config
            .proximity
            .pins
            .iter()
            .map(|&pin| {
                let switch = shared(SimulatedSwitch {
                    model: Arc::clone(&model),
                }) as super::Shared<dyn BinarySwitch>;
                (pin, switch)
            })
            .collect()
    } else {
        Vec::new()
    };

    info!(
        rpm = config.simulation.rpm,
        metal_probability = config.simulation.metal_probability,
        pyrometer_channels = config.pyrometer.channels,
        switches = config.proximity.pins.len(),
        "Simulated rig constructed"
    );

    Ok(Rig {
        distance: shared(SimulatedUltrasonic {
            model: Arc::clone(&model),
            jitter: StdRng::seed_from_u64(seed),
        }),
        thermal,
        pyrometers,
        switches,
        actuator: Box::new(SimulatedActuator {
            forward_pin: config.actuator.forward_pin,
            backward_pin: config.actuator.backward_pin,
            energised: None,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn model(rpm: f64, probability: f64) -> (CarouselModel, Instant) {
        let origin = Instant::now();
        let config = SimulationConfig {
            rpm,
            metal_probability: probability,
            ..SimulationConfig::default()
        };
        (CarouselModel::new(&config, origin), origin)
    }

    #[test]
    fn position_advances_one_partition_per_sixth_revolution() {
        // 1 rpm: one partition every 10 s
        let (model, origin) = model(1.0, 0.0);
        let pos = model.position_at(origin + Duration::from_secs(25));
        assert_eq!(pos.partition, 2);
        assert_eq!(pos.revolution, 0);
        assert!((pos.phase - 0.5).abs() < 1e-9);

        let pos = model.position_at(origin + Duration::from_secs(61));
        assert_eq!(pos.revolution, 1);
        assert_eq!(pos.partition, 0);
    }

    #[test]
    fn wall_only_at_partition_start() {
        let (model, origin) = model(1.0, 0.0);
        assert!(model.wall_in_range(origin + Duration::from_millis(500)));
        assert!(!model.wall_in_range(origin + Duration::from_secs(5)));
    }

    #[test]
    fn metal_placement_is_deterministic() {
        let (a, _) = model(1.0, 0.5);
        let (b, _) = model(1.0, 0.5);
        for rev in 0..4 {
            for p in 0..PARTITION_COUNT {
                assert_eq!(a.carries_metal(rev, p), b.carries_metal(rev, p));
            }
        }
    }

    #[test]
    fn probability_bounds_are_respected() {
        let (never, origin) = model(1.0, 0.0);
        let (always, _) = model(1.0, 1.0);
        let mid = origin + Duration::from_secs(5);
        assert!(!never.metal_under_sensors(mid));
        assert!(always.metal_under_sensors(mid));
        // walls pass before the object window
        assert!(!always.metal_under_sensors(origin + Duration::from_millis(500)));
    }

    #[test]
    fn duplicate_pin_is_an_address_conflict() {
        let mut config = SorterConfig::default();
        config.proximity.pins.push(config.actuator.forward_pin);
        let err = build_rig(&config).err().unwrap();
        assert!(matches!(
            err,
            HardwareError::Init {
                reason: InitFailure::AddressConflict,
                ..
            }
        ));
    }

    #[test]
    fn failed_channel_never_answers() {
        let mut config = SorterConfig::default();
        config.simulation.failed_pyrometer_channels = vec![3];
        let rig = build_rig(&config).unwrap();
        assert_eq!(rig.pyrometers.len(), 8);
        let failed = rig.pyrometers[3].as_ref().unwrap();
        assert!(super::super::lock(failed).read_object_temperature().is_err());
        let healthy = rig.pyrometers[2].as_ref().unwrap();
        assert!(super::super::lock(healthy).read_object_temperature().is_ok());
    }

    #[test]
    fn disabled_sources_are_not_constructed() {
        let mut config = SorterConfig::default();
        config.thermal.enabled = false;
        config.proximity.enabled = false;
        let rig = build_rig(&config).unwrap();
        assert!(rig.thermal.is_none());
        assert!(rig.switches.is_empty());
    }
}
