//! Pointer scripts: canned input replayed one line per frame.
//!
//! ```text
//! # a short diagonal stroke, then wipe the canvas
//! 100 100 down
//! 140 130 down
//! 140 130 up
//! clear
//! ```

use anyhow::{Context, Result, anyhow, bail};
use std::path::Path;

use stroke_sync::{FrameInput, Point};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScriptStep {
    /// Pointer sample for one frame.
    Pointer(FrameInput),
    /// Wipe the local canvas, as the clear button would.
    Clear,
}

pub fn load(path: &Path) -> Result<Vec<ScriptStep>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse(&source).with_context(|| format!("Invalid script {}", path.display()))
}

pub fn parse(source: &str) -> Result<Vec<ScriptStep>> {
    let mut steps = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let step = parse_line(line).with_context(|| format!("line {}: {:?}", idx + 1, raw))?;
        steps.push(step);
    }
    Ok(steps)
}

fn parse_line(line: &str) -> Result<ScriptStep> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        ["clear"] => Ok(ScriptStep::Clear),
        [x, y, button] => {
            let primary_down = match *button {
                "down" => true,
                "up" => false,
                other => bail!("expected `down` or `up`, found `{}`", other),
            };
            Ok(ScriptStep::Pointer(FrameInput {
                pointer: Point::new(coordinate(x)?, coordinate(y)?),
                primary_down,
            }))
        }
        _ => bail!("expected `<x> <y> down|up` or `clear`"),
    }
}

fn coordinate(field: &str) -> Result<f32> {
    let value: f32 = field
        .parse()
        .map_err(|_| anyhow!("`{}` is not a number", field))?;
    if !value.is_finite() {
        bail!("`{}` is not a finite coordinate", field);
    }
    Ok(value)
}
