use std::fmt;

use serde::de::{self, Deserializer, SeqAccess};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RiftrollConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default)]
    pub style: StyleSettings,
    #[serde(default)]
    pub model: ModelSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutSettings {
    pub seconds_per_screen_height: f64,
    pub rift_seconds: f64,
    pub rift_lead_fraction: f64,
    pub rift_min_fraction: f64,
    pub vertical_margin: f64,
    pub blur_margin: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleSettings {
    pub glow: Vec<GlowSettings>,
    pub rift_width: f64,
    /// `"#rrggbb"` or `[r, g, b]`.
    #[serde(deserialize_with = "deserialize_rgb")]
    pub background: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GlowSettings {
    pub width: f64,
    #[serde(default)]
    pub blur: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSettings {
    pub join_gap: f64,
}

fn default_version() -> u32 {
    1
}

impl Default for RiftrollConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            window: WindowSettings::default(),
            layout: LayoutSettings::default(),
            style: StyleSettings::default(),
            model: ModelSettings::default(),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 60,
        }
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            seconds_per_screen_height: 6.0,
            rift_seconds: 0.15,
            rift_lead_fraction: 1.0 / 3.0,
            rift_min_fraction: 0.8,
            vertical_margin: 0.2,
            blur_margin: 100.0,
        }
    }
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            glow: vec![
                GlowSettings {
                    width: 6.0,
                    blur: 40.0,
                },
                GlowSettings {
                    width: 6.0,
                    blur: 10.0,
                },
            ],
            rift_width: 24.0,
            background: [0, 0, 0],
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { join_gap: 0.2 }
    }
}

fn deserialize_rgb<'de, D>(deserializer: D) -> Result<[u8; 3], D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = [u8; 3];

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a colour as \"#rrggbb\" or [r, g, b]")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_hex_rgb(v).map_err(E::custom)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut rgb = [0u8; 3];
            for (index, channel) in rgb.iter_mut().enumerate() {
                let value: i64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(index, &self))?;
                *channel = u8::try_from(value)
                    .map_err(|_| de::Error::custom(format!("colour channel {value} is outside 0..=255")))?;
            }
            if seq.next_element::<de::IgnoredAny>()?.is_some() {
                return Err(de::Error::invalid_length(4, &self));
            }
            Ok(rgb)
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn parse_hex_rgb(raw: &str) -> Result<[u8; 3], String> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("invalid colour '{raw}'; expected #rrggbb"));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| format!("invalid colour '{raw}'; expected #rrggbb"))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

impl RiftrollConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RiftrollConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let window = &self.window;
        if window.width == 0 || window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be non-zero",
                window.width, window.height
            )));
        }
        if !(1..=240).contains(&window.fps) {
            return Err(ConfigError::Invalid(format!(
                "window fps {} must be between 1 and 240",
                window.fps
            )));
        }

        let layout = &self.layout;
        positive("layout.seconds_per_screen_height", layout.seconds_per_screen_height)?;
        non_negative("layout.rift_seconds", layout.rift_seconds)?;
        non_negative("layout.rift_lead_fraction", layout.rift_lead_fraction)?;
        non_negative("layout.blur_margin", layout.blur_margin)?;
        if !(0.0..=1.0).contains(&layout.rift_min_fraction) {
            return Err(ConfigError::Invalid(format!(
                "layout.rift_min_fraction {} must be within 0..=1",
                layout.rift_min_fraction
            )));
        }
        if !(0.0..0.5).contains(&layout.vertical_margin) {
            return Err(ConfigError::Invalid(format!(
                "layout.vertical_margin {} must be within 0..0.5",
                layout.vertical_margin
            )));
        }

        let style = &self.style;
        if style.glow.is_empty() {
            return Err(ConfigError::Invalid(
                "style.glow must contain at least one pass".into(),
            ));
        }
        for (index, pass) in style.glow.iter().enumerate() {
            positive(&format!("style.glow[{index}].width"), pass.width)?;
            non_negative(&format!("style.glow[{index}].blur"), pass.blur)?;
        }
        positive("style.rift_width", style.rift_width)?;

        non_negative("model.join_gap", self.model.join_gap)?;
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be a positive number, got {value}"
        )))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be zero or positive, got {value}"
        )))
    }
}
