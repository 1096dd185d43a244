//! GPIO tools: direct pin control restricted to an allow-list.

use async_trait::async_trait;
use microclaw_core::error::ToolError;
use microclaw_core::tool::{InputSchema, ParamKind, Tool, ToolArgs};
use std::sync::Arc;

use crate::board::{ADC_MAX, ADC_VREF, Board, PWM_DUTY_MAX};

const DEFAULT_PWM_FREQUENCY_HZ: i64 = 1000;

/// Which pins the model may touch. An empty list allows every pin.
#[derive(Debug, Clone, Default)]
pub struct PinGuard {
    allowed: Vec<u8>,
}

impl PinGuard {
    pub fn new(allowed: Vec<u8>) -> Self {
        Self { allowed }
    }

    /// Validate the `pin` argument.
    pub fn check(&self, args: &ToolArgs) -> Result<u8, ToolError> {
        let raw = args.i64("pin")?;
        let pin = u8::try_from(raw)
            .map_err(|_| ToolError::InvalidArguments(format!("pin {raw} is out of range")))?;
        if !self.allowed.is_empty() && !self.allowed.contains(&pin) {
            return Err(ToolError::InvalidArguments(format!(
                "Pin {pin} not in allowed pins: {:?}",
                self.allowed
            )));
        }
        Ok(pin)
    }
}

/// Shared state of every GPIO tool.
#[derive(Clone)]
pub struct Gpio {
    board: Arc<dyn Board>,
    guard: PinGuard,
}

impl Gpio {
    pub fn new(board: Arc<dyn Board>, allowed_pins: Vec<u8>) -> Self {
        Self {
            board,
            guard: PinGuard::new(allowed_pins),
        }
    }
}

fn level(high: bool) -> &'static str {
    if high { "HIGH" } else { "LOW" }
}

pub struct DigitalWriteTool(pub Gpio);

#[async_trait]
impl Tool for DigitalWriteTool {
    fn name(&self) -> &str {
        "digital_write"
    }

    fn description(&self) -> &str {
        "Set a GPIO pin HIGH (true) or LOW (false). Pin is configured as output automatically."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty()
            .required("pin", ParamKind::Integer, "GPIO pin number")
            .required("value", ParamKind::Boolean, "true for HIGH, false for LOW")
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let pin = self.0.guard.check(&args)?;
        let high = args.bool("value")?;
        self.0
            .board
            .digital_write(pin, high)
            .map_err(|e| ToolError::failed(self.name(), e.to_string()))?;
        Ok(format!("Pin {pin} set to {}", level(high)))
    }
}

pub struct DigitalReadTool(pub Gpio);

#[async_trait]
impl Tool for DigitalReadTool {
    fn name(&self) -> &str {
        "digital_read"
    }

    fn description(&self) -> &str {
        "Read the digital value of a GPIO pin (HIGH or LOW). Pin is configured as input with pull-up."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty().required("pin", ParamKind::Integer, "GPIO pin number")
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let pin = self.0.guard.check(&args)?;
        let high = self
            .0
            .board
            .digital_read(pin)
            .map_err(|e| ToolError::failed(self.name(), e.to_string()))?;
        Ok(format!("Pin {pin} reads {}", level(high)))
    }
}

pub struct AnalogReadTool(pub Gpio);

#[async_trait]
impl Tool for AnalogReadTool {
    fn name(&self) -> &str {
        "analog_read"
    }

    fn description(&self) -> &str {
        "Read an analog value from a GPIO pin (ADC). Returns raw 12-bit value (0-4095) and voltage (0-3.3V)."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty().required("pin", ParamKind::Integer, "GPIO pin number (must be ADC-capable)")
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let pin = self.0.guard.check(&args)?;
        let raw = self
            .0
            .board
            .analog_read(pin)
            .map_err(|e| ToolError::failed(self.name(), e.to_string()))?;
        let voltage = f64::from(raw) / f64::from(ADC_MAX) * ADC_VREF;
        Ok(format!(
            "Pin {pin} analog: raw={raw}/{ADC_MAX}, voltage={voltage:.2}V"
        ))
    }
}

pub struct PwmWriteTool(pub Gpio);

#[async_trait]
impl Tool for PwmWriteTool {
    fn name(&self) -> &str {
        "pwm_write"
    }

    fn description(&self) -> &str {
        "Set PWM output on a GPIO pin. Useful for dimming LEDs, controlling motor speed, etc."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty()
            .required("pin", ParamKind::Integer, "GPIO pin number")
            .required("duty", ParamKind::Number, "Duty cycle 0-100 (percent)")
            .optional("frequency", ParamKind::Integer, "PWM frequency in Hz (default 1000)")
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let pin = self.0.guard.check(&args)?;

        let duty = args.f64("duty")?;
        if !(0.0..=100.0).contains(&duty) {
            return Err(ToolError::InvalidArguments(
                "duty must be a number between 0 and 100".into(),
            ));
        }

        let frequency = args.opt_i64("frequency").unwrap_or(DEFAULT_PWM_FREQUENCY_HZ);
        let frequency = u32::try_from(frequency)
            .ok()
            .filter(|f| *f > 0)
            .ok_or_else(|| {
                ToolError::InvalidArguments("frequency must be a positive integer".into())
            })?;

        let raw_duty = (duty * f64::from(PWM_DUTY_MAX) / 100.0) as u16;
        self.0
            .board
            .pwm_write(pin, raw_duty, frequency)
            .map_err(|e| ToolError::failed(self.name(), e.to_string()))?;
        Ok(format!("Pin {pin} PWM: duty={duty}%, freq={frequency}Hz"))
    }
}

/// All GPIO tools sharing one board and allow-list.
pub fn gpio_tools(gpio: Gpio) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(DigitalWriteTool(gpio.clone())),
        Box::new(DigitalReadTool(gpio.clone())),
        Box::new(AnalogReadTool(gpio.clone())),
        Box::new(PwmWriteTool(gpio)),
    ]
}
