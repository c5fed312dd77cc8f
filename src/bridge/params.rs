//! Parameters the engine accepts, with host-side bounds checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{TRANSPOSE_MAX, TRANSPOSE_MIN, ZOOM_MAX, ZOOM_MIN};
use crate::error::BridgeError;

/// Boolean display switches understood by the engine's `setOption`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayOption {
    Title,
    Subtitle,
    Composer,
    Lyricist,
    PartNames,
    MeasureNumbers,
}

impl DisplayOption {
    pub const ALL: [DisplayOption; 6] = [
        DisplayOption::Title,
        DisplayOption::Subtitle,
        DisplayOption::Composer,
        DisplayOption::Lyricist,
        DisplayOption::PartNames,
        DisplayOption::MeasureNumbers,
    ];

    /// Option name on the engine side.
    pub fn engine_name(self) -> &'static str {
        match self {
            DisplayOption::Title => "drawTitle",
            DisplayOption::Subtitle => "drawSubtitle",
            DisplayOption::Composer => "drawComposer",
            DisplayOption::Lyricist => "drawLyricist",
            DisplayOption::PartNames => "drawPartNames",
            DisplayOption::MeasureNumbers => "drawMeasureNumbers",
        }
    }

    /// Short name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            DisplayOption::Title => "title",
            DisplayOption::Subtitle => "subtitle",
            DisplayOption::Composer => "composer",
            DisplayOption::Lyricist => "lyricist",
            DisplayOption::PartNames => "part-names",
            DisplayOption::MeasureNumbers => "measure-numbers",
        }
    }
}

impl fmt::Display for DisplayOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DisplayOption {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayOption::ALL
            .into_iter()
            .find(|o| o.name() == s || o.engine_name() == s)
            .ok_or_else(|| BridgeError::InvalidParameter(format!("unknown display option: {s}")))
    }
}

/// Current value of every display switch. Everything is drawn by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayToggles {
    pub title: bool,
    pub subtitle: bool,
    pub composer: bool,
    pub lyricist: bool,
    pub part_names: bool,
    pub measure_numbers: bool,
}

impl Default for DisplayToggles {
    fn default() -> Self {
        Self {
            title: true,
            subtitle: true,
            composer: true,
            lyricist: true,
            part_names: true,
            measure_numbers: true,
        }
    }
}

impl DisplayToggles {
    pub fn get(&self, option: DisplayOption) -> bool {
        match option {
            DisplayOption::Title => self.title,
            DisplayOption::Subtitle => self.subtitle,
            DisplayOption::Composer => self.composer,
            DisplayOption::Lyricist => self.lyricist,
            DisplayOption::PartNames => self.part_names,
            DisplayOption::MeasureNumbers => self.measure_numbers,
        }
    }

    pub fn set(&mut self, option: DisplayOption, enabled: bool) {
        let slot = match option {
            DisplayOption::Title => &mut self.title,
            DisplayOption::Subtitle => &mut self.subtitle,
            DisplayOption::Composer => &mut self.composer,
            DisplayOption::Lyricist => &mut self.lyricist,
            DisplayOption::PartNames => &mut self.part_names,
            DisplayOption::MeasureNumbers => &mut self.measure_numbers,
        };
        *slot = enabled;
    }
}

/// Page margins in engine units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageMargins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self::uniform(5.0)
    }
}

impl PageMargins {
    pub fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        for (side, value) in [
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
            ("left", self.left),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BridgeError::InvalidParameter(format!(
                    "{side} margin {value} must be a finite value >= 0"
                )));
            }
        }
        Ok(())
    }
}

/// Size of the container the engine lays out into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Whether either dimension moved by more than `threshold`.
    pub fn differs_from(&self, other: &ContainerSize, threshold: f64) -> bool {
        (self.width - other.width).abs() > threshold
            || (self.height - other.height).abs() > threshold
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.width.is_finite() || !self.height.is_finite() || self.is_empty() {
            return Err(BridgeError::InvalidParameter(format!(
                "container size {}x{} must be finite and positive",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ContainerSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub fn validate_zoom(zoom: f64) -> Result<(), BridgeError> {
    if !(ZOOM_MIN..=ZOOM_MAX).contains(&zoom) {
        return Err(BridgeError::InvalidParameter(format!(
            "zoom {zoom} outside [{ZOOM_MIN}, {ZOOM_MAX}]"
        )));
    }
    Ok(())
}

pub fn validate_transpose(semitones: i32) -> Result<(), BridgeError> {
    if !(TRANSPOSE_MIN..=TRANSPOSE_MAX).contains(&semitones) {
        return Err(BridgeError::InvalidParameter(format!(
            "transpose {semitones} outside [{TRANSPOSE_MIN}, {TRANSPOSE_MAX}]"
        )));
    }
    Ok(())
}

/// A single settable engine parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter {
    Zoom(f64),
    Transpose(i32),
    Display(DisplayOption, bool),
    Margins(PageMargins),
    ContainerSize(ContainerSize),
}

impl Parameter {
    /// Host-side bounds check, run before any engine call.
    pub fn validate(&self) -> Result<(), BridgeError> {
        match self {
            Parameter::Zoom(zoom) => validate_zoom(*zoom),
            Parameter::Transpose(semitones) => validate_transpose(*semitones),
            Parameter::Display(..) => Ok(()),
            Parameter::Margins(margins) => margins.validate(),
            Parameter::ContainerSize(size) => size.validate(),
        }
    }

    /// Parse a `name value` pair as typed on the command line.
    ///
    /// `name` is `zoom`, `transpose`, `margins`, `size`, or a display
    /// option. Margins take one or four numbers, size takes two.
    pub fn parse(name: &str, value: &str) -> Result<Parameter, BridgeError> {
        let invalid = |what: &str| BridgeError::InvalidParameter(format!("{name}: {what}"));
        match name {
            "zoom" => value
                .trim()
                .parse()
                .map(Parameter::Zoom)
                .map_err(|_| invalid("expected a number")),
            "transpose" => value
                .trim()
                .parse()
                .map(Parameter::Transpose)
                .map_err(|_| invalid("expected an integer")),
            "margins" => {
                let numbers = parse_numbers(value).ok_or_else(|| invalid("expected numbers"))?;
                match numbers.as_slice() {
                    [all] => Ok(Parameter::Margins(PageMargins::uniform(*all))),
                    [top, right, bottom, left] => Ok(Parameter::Margins(PageMargins {
                        top: *top,
                        right: *right,
                        bottom: *bottom,
                        left: *left,
                    })),
                    _ => Err(invalid("expected 1 or 4 numbers")),
                }
            }
            "size" => {
                let numbers = parse_numbers(value).ok_or_else(|| invalid("expected numbers"))?;
                match numbers.as_slice() {
                    [width, height] => {
                        Ok(Parameter::ContainerSize(ContainerSize::new(*width, *height)))
                    }
                    _ => Err(invalid("expected width and height")),
                }
            }
            other => {
                let option: DisplayOption = other.parse()?;
                let enabled = parse_switch(value).ok_or_else(|| invalid("expected on or off"))?;
                Ok(Parameter::Display(option, enabled))
            }
        }
    }
}

fn parse_numbers(value: &str) -> Option<Vec<f64>> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

/// Accepts on/off, true/false, yes/no, 1/0.
pub fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "show" => Some(true),
        "off" | "false" | "no" | "0" | "hide" => Some(false),
        _ => None,
    }
}
