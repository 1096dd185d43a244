//! Addressable LED strip tools (WS2812 / NeoPixel).

use async_trait::async_trait;
use microclaw_core::error::ToolError;
use microclaw_core::tool::{InputSchema, ParamKind, Tool, ToolArgs};
use std::sync::Arc;

use crate::board::{Board, Rgb};

fn channel(args: &ToolArgs, name: &str) -> Result<u8, ToolError> {
    let value = args.i64(name)?;
    u8::try_from(value)
        .map_err(|_| ToolError::InvalidArguments(format!("{name} must be 0-255, got {value}")))
}

fn color(args: &ToolArgs) -> Result<Rgb, ToolError> {
    Ok(Rgb::new(
        channel(args, "red")?,
        channel(args, "green")?,
        channel(args, "blue")?,
    ))
}

fn color_schema() -> InputSchema {
    InputSchema::empty()
        .required("red", ParamKind::Integer, "Red 0-255")
        .required("green", ParamKind::Integer, "Green 0-255")
        .required("blue", ParamKind::Integer, "Blue 0-255")
}

fn fill(board: &dyn Board, color: Rgb) -> Result<usize, String> {
    let count = board.pixel_count();
    for i in 0..count {
        board.set_pixel(i, color).map_err(|e| e.to_string())?;
    }
    board.show_pixels().map_err(|e| e.to_string())?;
    Ok(count)
}

pub struct SetLedColorTool {
    board: Arc<dyn Board>,
    description: String,
}

impl SetLedColorTool {
    pub fn new(board: Arc<dyn Board>) -> Self {
        let count = board.pixel_count();
        Self {
            description: format!(
                "Set one LED color. There are {count} LEDs (index 0-{}).",
                count.saturating_sub(1)
            ),
            board,
        }
    }
}

#[async_trait]
impl Tool for SetLedColorTool {
    fn name(&self) -> &str {
        "set_led_color"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> InputSchema {
        let mut schema = InputSchema::empty().required("index", ParamKind::Integer, "LED index");
        for p in color_schema().params() {
            schema = schema.required(&p.name, p.kind, &p.description);
        }
        schema
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let count = self.board.pixel_count();
        let index = args.i64("index")?;
        let index = usize::try_from(index)
            .ok()
            .filter(|i| *i < count)
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "index must be an integer 0-{}",
                    count.saturating_sub(1)
                ))
            })?;
        let rgb = color(&args)?;

        self.board
            .set_pixel(index, rgb)
            .and_then(|()| self.board.show_pixels())
            .map_err(|e| ToolError::failed(self.name(), e.to_string()))?;
        Ok(format!("LED {index} set to RGB({},{},{})", rgb.r, rgb.g, rgb.b))
    }
}

pub struct SetAllLedsTool {
    board: Arc<dyn Board>,
}

impl SetAllLedsTool {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for SetAllLedsTool {
    fn name(&self) -> &str {
        "set_all_leds"
    }

    fn description(&self) -> &str {
        "Set every LED on the strip to the same color."
    }

    fn input_schema(&self) -> InputSchema {
        color_schema()
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let rgb = color(&args)?;
        let count =
            fill(self.board.as_ref(), rgb).map_err(|e| ToolError::failed(self.name(), e))?;
        Ok(format!(
            "All {count} LEDs set to RGB({},{},{})",
            rgb.r, rgb.g, rgb.b
        ))
    }
}

pub struct ClearLedsTool {
    board: Arc<dyn Board>,
}

impl ClearLedsTool {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for ClearLedsTool {
    fn name(&self) -> &str {
        "clear_leds"
    }

    fn description(&self) -> &str {
        "Turn off all LEDs."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty()
    }

    async fn execute(&self, _args: ToolArgs) -> Result<String, ToolError> {
        let count = fill(self.board.as_ref(), Rgb::OFF)
            .map_err(|e| ToolError::failed(self.name(), e))?;
        Ok(format!("All {count} LEDs turned off"))
    }
}
