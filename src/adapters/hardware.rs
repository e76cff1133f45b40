//! Hardware adapter: bridges the wired peripherals to the domain port traits.
//!
//! Owns the [`IoBus`], the source pump, one valve per station, the
//! water-level probes and the ambient [`SensorHub`], exposing them through
//! [`SensorPort`] and [`ActuatorPort`].  This is the only module in the
//! system that drives actuators.
//!
//! Without backends (no hardware found) every read takes the simulation
//! path and a fill simply waits for the expected pumping time.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::config::HardwareConfig;
use crate::drivers::backend::Backends;
use crate::drivers::fill::{self, FillIo, FillOutcome, FillPhase, FillPlan, FillReport, WaitPolicy};
use crate::drivers::io::IoBus;
use crate::drivers::pump::SourcePump;
use crate::drivers::timebase::{Timebase, pause};
use crate::drivers::valve::Valve;
use crate::error::HardwareError;
use crate::pins::PinDirection;
use crate::sensors::SensorHub;
use crate::sensors::ambient::{AmbientDrivers, AmbientReadings};
use crate::sensors::water_level::{self, WaterLevelSensor};

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter {
    config: HardwareConfig,
    io: IoBus,
    pump: SourcePump,
    valves: Vec<Valve>,
    hub: SensorHub,
    timebase: Box<dyn Timebase + Send>,
    phase: FillPhase,
}

impl HardwareAdapter {
    /// `backends: None` selects no-hardware mode.  The configuration is
    /// expected to be validated already.
    pub fn new(
        config: HardwareConfig,
        backends: Option<Backends>,
        drivers: AmbientDrivers,
        timebase: Box<dyn Timebase + Send>,
    ) -> Self {
        let pump = SourcePump::new(config.source.pin);
        let valves = config.stations.iter().map(|s| Valve::new(s.pin)).collect();
        let hub = SensorHub::new(config.ambient.clone(), drivers);
        Self {
            config,
            io: IoBus::new(backends),
            pump,
            valves,
            hub,
            timebase,
            phase: FillPhase::Idle,
        }
    }

    /// Bring every pin to its startup state: all expander pins inputs,
    /// then the pump, valves and probe enables as outputs driven low.
    pub fn init(&mut self) -> Result<(), HardwareError> {
        self.io.all_inputs()?;
        self.pump.init(&mut self.io)?;
        for valve in &mut self.valves {
            valve.init(&mut self.io)?;
        }
        for sensor in &self.config.level_sensors {
            if let Some(pin) = sensor.enable_pin() {
                self.io.configure(pin, PinDirection::Output)?;
            }
            water_level::rest(&mut self.io, sensor)?;
        }
        info!(
            "hardware ready: {} stations, {} expanders, {} ADCs",
            self.valves.len(),
            self.config.expanders.len(),
            self.config.adcs.len()
        );
        Ok(())
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn phase(&self) -> FillPhase {
        self.phase
    }

    pub fn is_pump_running(&self) -> bool {
        self.pump.is_running()
    }

    pub fn is_valve_open(&self, station: usize) -> bool {
        self.valves.get(station).is_some_and(Valve::is_open)
    }

    /// Backend calls issued so far.
    pub fn backend_ops(&self) -> u64 {
        self.io.backend_ops()
    }

    /// Pumping time the flow calibration predicts for a station's capacity.
    pub fn expected_fill_time(&self, station: usize) -> Result<Duration, HardwareError> {
        let cfg = self
            .config
            .stations
            .get(station)
            .ok_or(HardwareError::NoSuchStation(station))?;
        self.config.source.flow_time_for(cfg.capacity_liters)
    }

    fn probe(&mut self, sensor: WaterLevelSensor) -> Result<f32, HardwareError> {
        water_level::read_level(&mut self.io, &mut *self.timebase, &sensor)
    }

    fn read_station(&mut self, station: usize) -> Result<f32, HardwareError> {
        let sensor = *self
            .config
            .station_sensor(station)
            .ok_or(HardwareError::NoSuchSensor(station))?;
        self.probe(sensor)
    }

    fn read_source(&mut self) -> Result<f32, HardwareError> {
        if self.config.source.is_unlimited() {
            return Ok(1.0);
        }
        let index = self.config.level_sensors.len().saturating_sub(1);
        let sensor = *self
            .config
            .source_sensor()
            .ok_or(HardwareError::NoSuchSensor(index))?;
        self.probe(sensor)
    }

    fn plan(&self, station: usize, upper_threshold: f32, timeout_factor: f64) -> Result<FillPlan, HardwareError> {
        let cfg = self
            .config
            .stations
            .get(station)
            .ok_or(HardwareError::NoSuchStation(station))?;
        let sensor = self
            .config
            .station_sensor(station)
            .ok_or(HardwareError::NoSuchSensor(station))?;
        Ok(FillPlan {
            station,
            upper_threshold,
            expected: self.config.source.flow_time_for(cfg.capacity_liters)?,
            policy: if sensor.detects_full() {
                WaitPolicy::UntilFull
            } else {
                WaitPolicy::Fixed
            },
            valve_settle: cfg.settle()?,
            source_settle: self.config.source.settle()?,
            timeout_factor,
        })
    }
}

// ── FillIo implementation ─────────────────────────────────────

impl FillIo for HardwareAdapter {
    fn enter_phase(&mut self, phase: FillPhase) {
        debug!("FILL | phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn open_valve(&mut self, station: usize) -> Result<(), HardwareError> {
        self.valves
            .get_mut(station)
            .ok_or(HardwareError::NoSuchStation(station))?
            .open(&mut self.io)
    }

    fn close_valve(&mut self, station: usize) -> Result<(), HardwareError> {
        self.valves
            .get_mut(station)
            .ok_or(HardwareError::NoSuchStation(station))?
            .close(&mut self.io)
    }

    fn start_pump(&mut self) -> Result<(), HardwareError> {
        self.pump.start(&mut self.io)
    }

    fn stop_pump(&mut self) -> Result<(), HardwareError> {
        self.pump.stop(&mut self.io)
    }

    fn station_level(&mut self, station: usize) -> Result<f32, HardwareError> {
        self.read_station(station)
    }

    fn source_level(&mut self) -> Result<f32, HardwareError> {
        self.read_source()
    }

    fn pause(&mut self, duration: Duration) {
        pause(&mut *self.timebase, duration);
    }

    fn elapsed(&self) -> Duration {
        self.timebase.elapsed()
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl SensorPort for HardwareAdapter {
    fn station_count(&self) -> usize {
        self.valves.len()
    }

    fn is_simulated(&self) -> bool {
        self.io.is_simulated()
    }

    fn source_level(&mut self) -> Result<f32, HardwareError> {
        self.read_source()
    }

    fn station_level(&mut self, station: usize) -> Result<f32, HardwareError> {
        self.read_station(station)
    }

    fn ambient(&mut self) -> AmbientReadings {
        self.hub.read_all(&mut self.io)
    }

    fn describe_station(&self, station: usize) -> Result<String, HardwareError> {
        let cfg = self
            .config
            .stations
            .get(station)
            .ok_or(HardwareError::NoSuchStation(station))?;
        let sensor = self
            .config
            .station_sensor(station)
            .ok_or(HardwareError::NoSuchSensor(station))?;
        let fill_time = self.config.source.flow_time_for(cfg.capacity_liters)?;
        Ok(format!(
            "volume is {} l, fill time is {:.1} s, {}",
            cfg.capacity_liters,
            fill_time.as_secs_f64(),
            sensor.describe()
        ))
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl ActuatorPort for HardwareAdapter {
    fn fill_station(
        &mut self,
        station: usize,
        upper_threshold: f32,
        timeout_factor: f64,
    ) -> Result<FillReport, HardwareError> {
        let plan = self.plan(station, upper_threshold, timeout_factor)?;
        info!(
            "FILL | station={station} expected={:.1}s policy={:?}",
            plan.expected.as_secs_f64(),
            plan.policy
        );

        if self.io.is_simulated() {
            pause(&mut *self.timebase, plan.expected);
            return Ok(FillReport {
                station,
                outcome: FillOutcome::Completed {
                    elapsed: plan.expected,
                },
                expected: plan.expected,
                limit: plan.time_limit(),
            });
        }

        let report = fill::run_fill(self, &plan)?;
        if report.exceeded_limit() {
            warn!(
                "FILL | station={station} pumped {:.1}s, over the {:.1}s limit",
                report.outcome.elapsed().as_secs_f64(),
                report.limit.as_secs_f64()
            );
        }
        Ok(report)
    }

    fn filled_volume(&self, elapsed: Duration) -> f64 {
        self.config.source.flow_volume_for(elapsed)
    }

    fn stop_pump(&mut self) -> Result<(), HardwareError> {
        self.pump.stop(&mut self.io)
    }

    fn all_off(&mut self) {
        if let Err(e) = self.pump.stop(&mut self.io) {
            error!("pump stop failed: {e}");
        }
        for (i, valve) in self.valves.iter_mut().enumerate() {
            if let Err(e) = valve.close(&mut self.io) {
                error!("valve {i} close failed: {e}");
            }
        }
        for sensor in &self.config.level_sensors {
            if let Err(e) = water_level::rest(&mut self.io, sensor) {
                warn!("probe rest failed: {e}");
            }
        }
        self.phase = FillPhase::Idle;
    }

    fn release(&mut self) {
        self.all_off();
        if self.io.release().is_some() {
            info!("hardware released");
        }
    }
}

impl Drop for HardwareAdapter {
    fn drop(&mut self) {
        if !self.io.is_simulated() {
            self.all_off();
        }
    }
}
