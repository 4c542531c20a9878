//! Folder configurations.
//!
//! A [`Configuration`] is the set of qualifiers that distinguishes variants of
//! the same resource (`values`, `values-fr`, `values-fr-land-xhdpi`, ...).
//!
//! Configurations are totally ordered: qualifiers are compared one at a time
//! in folder order, and an absent qualifier sorts before any present value.
//! The default configuration therefore sorts first. This order is what the
//! merged maps binary-search on.
//!
//! # Qualifier Order
//!
//! ```text
//! locale - layout direction - smallest width - width - height
//!        - orientation - night mode - density - api level
//! ```
//!
//! Qualifiers must appear in this order in a qualifier string; anything else
//! is rejected, as are unknown qualifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Qualifier string of the default configuration.
pub const DEFAULT_QUALIFIER: &str = "default";

/// Errors parsing a qualifier string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The token is not a recognised qualifier.
    #[error("unknown qualifier '{0}'")]
    UnknownQualifier(String),

    /// The qualifier appears after a qualifier that must follow it.
    #[error("qualifier '{qualifier}' is out of order in '{input}'")]
    OutOfOrder { qualifier: String, input: String },

    /// A region was given without a preceding language.
    #[error("region qualifier '{0}' must directly follow a language")]
    DanglingRegion(String),

    /// A numeric qualifier value does not fit.
    #[error("invalid value in qualifier '{0}'")]
    InvalidValue(String),
}

/// Language and optional region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locale {
    /// ISO 639 language code (lower case).
    pub language: String,
    /// ISO 3166 region code (upper case), without the `r` prefix.
    pub region: Option<String>,
}

impl Locale {
    /// Create a locale.
    pub fn new(language: impl Into<String>, region: Option<&str>) -> Self {
        Self {
            language: language.into(),
            region: region.map(str::to_string),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}-r{}", self.language, region),
            None => write!(f, "{}", self.language),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayoutDirection {
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NightMode {
    NotNight,
    Night,
}

/// Screen density bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Density {
    Ldpi,
    Mdpi,
    Tvdpi,
    Hdpi,
    Xhdpi,
    Xxhdpi,
    Xxxhdpi,
    Nodpi,
    Anydpi,
}

impl Density {
    const ALL: [Density; 9] = [
        Density::Ldpi,
        Density::Mdpi,
        Density::Tvdpi,
        Density::Hdpi,
        Density::Xhdpi,
        Density::Xxhdpi,
        Density::Xxxhdpi,
        Density::Nodpi,
        Density::Anydpi,
    ];

    /// Qualifier token for this density.
    pub fn qualifier(&self) -> &'static str {
        match self {
            Density::Ldpi => "ldpi",
            Density::Mdpi => "mdpi",
            Density::Tvdpi => "tvdpi",
            Density::Hdpi => "hdpi",
            Density::Xhdpi => "xhdpi",
            Density::Xxhdpi => "xxhdpi",
            Density::Xxxhdpi => "xxxhdpi",
            Density::Nodpi => "nodpi",
            Density::Anydpi => "anydpi",
        }
    }

    /// Dots per inch, for the buckets that have one.
    pub fn dpi(&self) -> Option<u32> {
        match self {
            Density::Ldpi => Some(120),
            Density::Mdpi => Some(160),
            Density::Tvdpi => Some(213),
            Density::Hdpi => Some(240),
            Density::Xhdpi => Some(320),
            Density::Xxhdpi => Some(480),
            Density::Xxxhdpi => Some(640),
            Density::Nodpi | Density::Anydpi => None,
        }
    }
}

/// Qualifier set distinguishing variants of a same-named resource.
///
/// Field order is comparison order; do not reorder the fields.
///
/// # Example
///
/// ```
/// use resourcetree::resource::Configuration;
///
/// let default = Configuration::default();
/// let french: Configuration = "fr".parse().unwrap();
/// let french_land: Configuration = "fr-land".parse().unwrap();
///
/// assert!(default < french);
/// assert!(french < french_land);
/// assert_eq!(french_land.to_string(), "fr-land");
/// assert_eq!(default.to_string(), "default");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Configuration {
    locale: Option<Locale>,
    layout_direction: Option<LayoutDirection>,
    smallest_width_dp: Option<u32>,
    width_dp: Option<u32>,
    height_dp: Option<u32>,
    orientation: Option<Orientation>,
    night_mode: Option<NightMode>,
    density: Option<Density>,
    api_level: Option<u32>,
}

impl Configuration {
    /// The default (unqualified) configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no qualifier is set.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn locale(&self) -> Option<&Locale> {
        self.locale.as_ref()
    }

    pub fn density(&self) -> Option<Density> {
        self.density
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.orientation
    }

    pub fn api_level(&self) -> Option<u32> {
        self.api_level
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn with_layout_direction(mut self, direction: LayoutDirection) -> Self {
        self.layout_direction = Some(direction);
        self
    }

    pub fn with_smallest_width_dp(mut self, dp: u32) -> Self {
        self.smallest_width_dp = Some(dp);
        self
    }

    pub fn with_width_dp(mut self, dp: u32) -> Self {
        self.width_dp = Some(dp);
        self
    }

    pub fn with_height_dp(mut self, dp: u32) -> Self {
        self.height_dp = Some(dp);
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_night_mode(mut self, night_mode: NightMode) -> Self {
        self.night_mode = Some(night_mode);
        self
    }

    pub fn with_density(mut self, density: Density) -> Self {
        self.density = Some(density);
        self
    }

    pub fn with_api_level(mut self, api_level: u32) -> Self {
        self.api_level = Some(api_level);
        self
    }

    /// Qualifier string without the `default` placeholder (empty for the
    /// default configuration), suitable for appending to a folder name.
    pub fn qualifier_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(locale) = &self.locale {
            parts.push(locale.to_string());
        }
        if let Some(direction) = self.layout_direction {
            parts.push(
                match direction {
                    LayoutDirection::Ltr => "ldltr",
                    LayoutDirection::Rtl => "ldrtl",
                }
                .to_string(),
            );
        }
        if let Some(dp) = self.smallest_width_dp {
            parts.push(format!("sw{}dp", dp));
        }
        if let Some(dp) = self.width_dp {
            parts.push(format!("w{}dp", dp));
        }
        if let Some(dp) = self.height_dp {
            parts.push(format!("h{}dp", dp));
        }
        if let Some(orientation) = self.orientation {
            parts.push(
                match orientation {
                    Orientation::Portrait => "port",
                    Orientation::Landscape => "land",
                    Orientation::Square => "square",
                }
                .to_string(),
            );
        }
        if let Some(night_mode) = self.night_mode {
            parts.push(
                match night_mode {
                    NightMode::NotNight => "notnight",
                    NightMode::Night => "night",
                }
                .to_string(),
            );
        }
        if let Some(density) = self.density {
            parts.push(density.qualifier().to_string());
        }
        if let Some(api_level) = self.api_level {
            parts.push(format!("v{}", api_level));
        }
        parts.join("-")
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str(DEFAULT_QUALIFIER)
        } else {
            f.write_str(&self.qualifier_string())
        }
    }
}

/// Position of each qualifier kind in folder order.
const LOCALE: u8 = 1;
const LAYOUT_DIRECTION: u8 = 2;
const SMALLEST_WIDTH: u8 = 3;
const WIDTH: u8 = 4;
const HEIGHT: u8 = 5;
const ORIENTATION: u8 = 6;
const NIGHT_MODE: u8 = 7;
const DENSITY: u8 = 8;
const API_LEVEL: u8 = 9;

/// Pattern for the numeric qualifiers.
///
/// Named groups: `sw` (smallest width), `w` (width), `h` (height), `v` (api level).
fn numeric_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:sw(?P<sw>\d+)dp|w(?P<w>\d+)dp|h(?P<h>\d+)dp|v(?P<v>\d+))$")
            .expect("numeric qualifier pattern is valid")
    })
}

fn language_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]{2,3}$").expect("language pattern is valid"))
}

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^r([A-Z]{2})$").expect("region pattern is valid"))
}

fn parse_number(token: &str, digits: &str) -> Result<u32, ConfigurationError> {
    digits
        .parse()
        .map_err(|_| ConfigurationError::InvalidValue(token.to_string()))
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Configuration::default();
        if s.is_empty() || s == DEFAULT_QUALIFIER {
            return Ok(config);
        }

        let mut last_position = 0u8;
        let mut previous_was_language = false;

        for token in s.split('-') {
            if let Some(captures) = region_pattern().captures(token) {
                let locale = match (&mut config.locale, previous_was_language) {
                    (Some(locale), true) => locale,
                    _ => return Err(ConfigurationError::DanglingRegion(token.to_string())),
                };
                locale.region = Some(captures[1].to_string());
                previous_was_language = false;
                continue;
            }
            previous_was_language = false;

            let position = if language_pattern().is_match(token) {
                config.locale = Some(Locale::new(token, None));
                previous_was_language = true;
                LOCALE
            } else if let Some(captures) = numeric_pattern().captures(token) {
                if let Some(m) = captures.name("sw") {
                    config.smallest_width_dp = Some(parse_number(token, m.as_str())?);
                    SMALLEST_WIDTH
                } else if let Some(m) = captures.name("w") {
                    config.width_dp = Some(parse_number(token, m.as_str())?);
                    WIDTH
                } else if let Some(m) = captures.name("h") {
                    config.height_dp = Some(parse_number(token, m.as_str())?);
                    HEIGHT
                } else if let Some(m) = captures.name("v") {
                    config.api_level = Some(parse_number(token, m.as_str())?);
                    API_LEVEL
                } else {
                    return Err(ConfigurationError::UnknownQualifier(token.to_string()));
                }
            } else {
                match token {
                    "ldltr" => {
                        config.layout_direction = Some(LayoutDirection::Ltr);
                        LAYOUT_DIRECTION
                    }
                    "ldrtl" => {
                        config.layout_direction = Some(LayoutDirection::Rtl);
                        LAYOUT_DIRECTION
                    }
                    "port" => {
                        config.orientation = Some(Orientation::Portrait);
                        ORIENTATION
                    }
                    "land" => {
                        config.orientation = Some(Orientation::Landscape);
                        ORIENTATION
                    }
                    "square" => {
                        config.orientation = Some(Orientation::Square);
                        ORIENTATION
                    }
                    "night" => {
                        config.night_mode = Some(NightMode::Night);
                        NIGHT_MODE
                    }
                    "notnight" => {
                        config.night_mode = Some(NightMode::NotNight);
                        NIGHT_MODE
                    }
                    _ => match Density::ALL.iter().find(|d| d.qualifier() == token) {
                        Some(density) => {
                            config.density = Some(*density);
                            DENSITY
                        }
                        None => {
                            return Err(ConfigurationError::UnknownQualifier(token.to_string()))
                        }
                    },
                }
            };

            if position <= last_position {
                return Err(ConfigurationError::OutOfOrder {
                    qualifier: token.to_string(),
                    input: s.to_string(),
                });
            }
            last_position = position;
        }

        Ok(config)
    }
}

impl TryFrom<String> for Configuration {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Configuration> for String {
    fn from(config: Configuration) -> Self {
        config.to_string()
    }
}
