//! Board driver abstraction.
//!
//! The concrete sensor and actuator drivers live outside this workspace; the
//! tools only talk to a [`Board`]. [`SimulatedBoard`] keeps all state in
//! memory so the agent can run (and be tested) on a host machine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Full-scale value of the 12-bit ADC.
pub const ADC_MAX: u16 = 4095;

/// Reference voltage at full scale.
pub const ADC_VREF: f64 = 3.3;

/// Full-scale PWM duty (10-bit).
pub const PWM_DUTY_MAX: u16 = 1023;

/// CPU frequencies the chip accepts, in MHz.
pub const CPU_FREQUENCIES_MHZ: [u32; 3] = [80, 160, 240];

/// Board driver failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("Pin {0} is not available on this board")]
    InvalidPin(u8),

    #[error("LED index {index} out of range (strip has {count} LEDs)")]
    InvalidPixel { index: usize, count: usize },

    #[error("Unsupported CPU frequency: {0}MHz")]
    UnsupportedFrequency(u32),

    #[error("Hardware fault: {0}")]
    Hardware(String),
}

/// An RGB color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Static facts about the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub platform: String,
    pub firmware: String,
    pub cpu_mhz: u32,
    pub flash_free_kb: u32,
    pub flash_total_kb: u32,
    pub uptime_ms: u64,
}

/// Heap usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub free: usize,
    pub used: usize,
}

impl MemoryInfo {
    pub fn total(&self) -> usize {
        self.free + self.used
    }

    pub fn percent_free(&self) -> usize {
        match self.total() {
            0 => 0,
            total => self.free * 100 / total,
        }
    }
}

/// The hardware seam. Every call runs to completion before returning.
pub trait Board: Send + Sync {
    fn memory(&self) -> MemoryInfo;

    fn system_info(&self) -> SystemInfo;

    fn set_cpu_frequency(&self, mhz: u32) -> Result<(), BoardError>;

    /// Drive a pin as a digital output.
    fn digital_write(&self, pin: u8, high: bool) -> Result<(), BoardError>;

    /// Read a pin as a pulled-up digital input.
    fn digital_read(&self, pin: u8) -> Result<bool, BoardError>;

    /// Raw 12-bit ADC sample.
    fn analog_read(&self, pin: u8) -> Result<u16, BoardError>;

    /// `duty` is in `0..=PWM_DUTY_MAX`.
    fn pwm_write(&self, pin: u8, duty: u16, frequency_hz: u32) -> Result<(), BoardError>;

    /// Number of LEDs on the addressable strip.
    fn pixel_count(&self) -> usize;

    /// Stage a color; nothing is visible until [`Board::show_pixels`].
    fn set_pixel(&self, index: usize, color: Rgb) -> Result<(), BoardError>;

    fn show_pixels(&self) -> Result<(), BoardError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Output(bool),
    Input(bool),
    Pwm { duty: u16, frequency_hz: u32 },
}

#[derive(Debug, Default)]
struct SimState {
    cpu_mhz: u32,
    pins: HashMap<u8, PinState>,
    inputs: HashMap<u8, bool>,
    analog: HashMap<u8, u16>,
    staged: Vec<Rgb>,
    shown: Vec<Rgb>,
    writes: usize,
}

/// In-memory board for host runs and tests.
pub struct SimulatedBoard {
    pin_count: u8,
    heap_total: usize,
    started: Instant,
    state: Mutex<SimState>,
}

impl SimulatedBoard {
    /// A board with 40 GPIOs, a 160 KB heap and `leds` strip pixels.
    pub fn new(leds: usize) -> Self {
        Self {
            pin_count: 40,
            heap_total: 160 * 1024,
            started: Instant::now(),
            state: Mutex::new(SimState {
                cpu_mhz: 160,
                staged: vec![Rgb::OFF; leds],
                shown: vec![Rgb::OFF; leds],
                ..SimState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_pin(&self, pin: u8) -> Result<(), BoardError> {
        if pin >= self.pin_count {
            return Err(BoardError::InvalidPin(pin));
        }
        Ok(())
    }

    /// Set the level a digital input will read.
    pub fn set_input(&self, pin: u8, high: bool) {
        self.state().inputs.insert(pin, high);
    }

    /// Set the raw ADC value a pin will read.
    pub fn set_analog(&self, pin: u8, raw: u16) {
        self.state().analog.insert(pin, raw.min(ADC_MAX));
    }

    pub fn pin_state(&self, pin: u8) -> Option<PinState> {
        self.state().pins.get(&pin).copied()
    }

    /// Color currently displayed (after the last `show_pixels`).
    pub fn pixel(&self, index: usize) -> Option<Rgb> {
        self.state().shown.get(index).copied()
    }

    /// Number of strip refreshes so far.
    pub fn pixel_writes(&self) -> usize {
        self.state().writes
    }

    pub fn cpu_mhz(&self) -> u32 {
        self.state().cpu_mhz
    }
}

impl Board for SimulatedBoard {
    fn memory(&self) -> MemoryInfo {
        let state = self.state();
        // Rough model: each configured peripheral costs a little heap.
        let used = 48 * 1024 + (state.pins.len() + state.staged.len()) * 64;
        MemoryInfo {
            free: self.heap_total.saturating_sub(used),
            used: used.min(self.heap_total),
        }
    }

    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            platform: "simulated".into(),
            firmware: concat!("microclaw ", env!("CARGO_PKG_VERSION")).into(),
            cpu_mhz: self.state().cpu_mhz,
            flash_free_kb: 1_408,
            flash_total_kb: 2_048,
            uptime_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    fn set_cpu_frequency(&self, mhz: u32) -> Result<(), BoardError> {
        if !CPU_FREQUENCIES_MHZ.contains(&mhz) {
            return Err(BoardError::UnsupportedFrequency(mhz));
        }
        self.state().cpu_mhz = mhz;
        Ok(())
    }

    fn digital_write(&self, pin: u8, high: bool) -> Result<(), BoardError> {
        self.check_pin(pin)?;
        self.state().pins.insert(pin, PinState::Output(high));
        Ok(())
    }

    fn digital_read(&self, pin: u8) -> Result<bool, BoardError> {
        self.check_pin(pin)?;
        let mut state = self.state();
        // Pull-up: unconnected inputs read high.
        let level = state.inputs.get(&pin).copied().unwrap_or(true);
        state.pins.insert(pin, PinState::Input(level));
        Ok(level)
    }

    fn analog_read(&self, pin: u8) -> Result<u16, BoardError> {
        self.check_pin(pin)?;
        Ok(self.state().analog.get(&pin).copied().unwrap_or(0))
    }

    fn pwm_write(&self, pin: u8, duty: u16, frequency_hz: u32) -> Result<(), BoardError> {
        self.check_pin(pin)?;
        if frequency_hz == 0 {
            return Err(BoardError::Hardware("PWM frequency must be > 0".into()));
        }
        self.state().pins.insert(
            pin,
            PinState::Pwm {
                duty: duty.min(PWM_DUTY_MAX),
                frequency_hz,
            },
        );
        Ok(())
    }

    fn pixel_count(&self) -> usize {
        self.state().staged.len()
    }

    fn set_pixel(&self, index: usize, color: Rgb) -> Result<(), BoardError> {
        let mut state = self.state();
        let count = state.staged.len();
        match state.staged.get_mut(index) {
            Some(slot) => {
                *slot = color;
                Ok(())
            }
            None => Err(BoardError::InvalidPixel { index, count }),
        }
    }

    fn show_pixels(&self) -> Result<(), BoardError> {
        let mut state = self.state();
        state.shown = state.staged.clone();
        state.writes += 1;
        Ok(())
    }
}
