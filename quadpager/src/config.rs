//! Pager configuration.
//!
//! All tunables for coverage, scheduling and loading live in [`PagerConfig`].
//! Values can be set programmatically with the `with_*` builders or loaded
//! from the `[pager]` section of an INI file:
//!
//! ```ini
//! [pager]
//! max_simultaneous_fetches = 16
//! min_update_period = 0.25
//! single_level = true
//! multi_level_loads = -4, -2
//! ```
//!
//! # Example
//!
//! ```
//! use quadpager::config::PagerConfig;
//!
//! let config = PagerConfig::default()
//!     .with_max_tiles(256)
//!     .with_require_siblings(true);
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use crate::coord::MAX_LEVEL;
use crate::error::ConfigError;

// =============================================================================
// Defaults
// =============================================================================

/// INI section holding pager settings.
pub const CONFIG_SECTION: &str = "pager";

/// Default bound on concurrently running tile fetches.
pub const DEFAULT_MAX_SIMULTANEOUS_FETCHES: usize = 8;

/// Default minimum time between two reconciliation passes.
pub const DEFAULT_MIN_UPDATE_PERIOD: Duration = Duration::from_millis(100);

/// Default minimum eye movement before reconciling. Zero disables the gate.
pub const DEFAULT_MIN_UPDATE_DISTANCE: f64 = 0.0;

/// Default time to hold scene updates while local fetches finish.
pub const DEFAULT_WAIT_FOR_LOCAL_TIMEOUT: Duration = Duration::from_secs(4);

/// Default cap on loaded tiles.
pub const DEFAULT_MAX_TILES: usize = 128;

/// Default importance multiplier.
pub const DEFAULT_IMPORTANCE_SCALE: f64 = 1.0;

/// Default deepest level.
pub const DEFAULT_MAX_ZOOM: u32 = 18;

/// Default minimum importance: one 256x256 tile worth of pixels.
pub const DEFAULT_MIN_IMPORTANCE: f64 = 256.0 * 256.0;

// =============================================================================
// PagerConfig
// =============================================================================

/// Configuration for coverage and tile scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct PagerConfig {
    /// Bound on fetches running at the same time. At least 1.
    pub max_simultaneous_fetches: usize,

    /// Minimum time between reconciliation passes.
    pub min_update_period: Duration,

    /// Minimum eye movement in display units before reconciling.
    pub min_update_distance: f64,

    /// Hold scene updates until local fetches complete or time out.
    pub wait_for_local: bool,

    /// How long `wait_for_local` may hold updates.
    pub wait_for_local_timeout: Duration,

    /// Cap on tiles tracked at once. Lowest importance is evicted first.
    pub max_tiles: usize,

    /// Evict the old level immediately when switching levels.
    ///
    /// Only meaningful with `single_level`. Saves memory at the cost of a
    /// blank frame during level transitions.
    pub single_level_loading: bool,

    /// Level offsets relative to the target level that are also loaded.
    ///
    /// Coarser offsets load first. Each entry is zero or negative.
    pub multi_level_loads: Vec<i32>,

    /// Multiplier applied to screen-space importance.
    pub importance_scale: f64,

    /// Texels of border around each tile image.
    pub border_texel: u32,

    /// Tile source counts rows from the top.
    pub flip_y: bool,

    pub min_zoom: u32,
    pub max_zoom: u32,

    /// Minimum importance for a node to be loaded or expanded.
    pub min_importance: f64,

    /// Display one target level instead of a blended pyramid.
    pub single_level: bool,

    /// Load all four children of a parent or none of them.
    pub require_siblings: bool,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            max_simultaneous_fetches: DEFAULT_MAX_SIMULTANEOUS_FETCHES,
            min_update_period: DEFAULT_MIN_UPDATE_PERIOD,
            min_update_distance: DEFAULT_MIN_UPDATE_DISTANCE,
            wait_for_local: false,
            wait_for_local_timeout: DEFAULT_WAIT_FOR_LOCAL_TIMEOUT,
            max_tiles: DEFAULT_MAX_TILES,
            single_level_loading: false,
            multi_level_loads: Vec::new(),
            importance_scale: DEFAULT_IMPORTANCE_SCALE,
            border_texel: 0,
            flip_y: true,
            min_zoom: 0,
            max_zoom: DEFAULT_MAX_ZOOM,
            min_importance: DEFAULT_MIN_IMPORTANCE,
            single_level: false,
            require_siblings: false,
        }
    }
}

impl PagerConfig {
    pub fn with_max_simultaneous_fetches(mut self, count: usize) -> Self {
        self.max_simultaneous_fetches = count;
        self
    }

    pub fn with_min_update_period(mut self, period: Duration) -> Self {
        self.min_update_period = period;
        self
    }

    pub fn with_min_update_distance(mut self, distance: f64) -> Self {
        self.min_update_distance = distance;
        self
    }

    pub fn with_wait_for_local(mut self, enabled: bool, timeout: Duration) -> Self {
        self.wait_for_local = enabled;
        self.wait_for_local_timeout = timeout;
        self
    }

    pub fn with_max_tiles(mut self, count: usize) -> Self {
        self.max_tiles = count;
        self
    }

    pub fn with_single_level(mut self, enabled: bool) -> Self {
        self.single_level = enabled;
        self
    }

    pub fn with_single_level_loading(mut self, enabled: bool) -> Self {
        self.single_level_loading = enabled;
        self
    }

    pub fn with_multi_level_loads(mut self, offsets: Vec<i32>) -> Self {
        self.multi_level_loads = offsets;
        self
    }

    pub fn with_importance_scale(mut self, scale: f64) -> Self {
        self.importance_scale = scale;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u32, max_zoom: u32) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_min_importance(mut self, importance: f64) -> Self {
        self.min_importance = importance;
        self
    }

    pub fn with_require_siblings(mut self, enabled: bool) -> Self {
        self.require_siblings = enabled;
        self
    }

    pub fn with_border_texel(mut self, texels: u32) -> Self {
        self.border_texel = texels;
        self
    }

    pub fn with_flip_y(mut self, flip: bool) -> Self {
        self.flip_y = flip;
        self
    }

    /// Checks every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_simultaneous_fetches < 1 {
            return Err(ConfigError::invalid(
                "max_simultaneous_fetches",
                self.max_simultaneous_fetches,
                "must be at least 1",
            ));
        }
        if !(self.min_update_distance >= 0.0) {
            return Err(ConfigError::invalid(
                "min_update_distance",
                self.min_update_distance,
                "must be non-negative",
            ));
        }
        if self.wait_for_local && self.wait_for_local_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "wait_for_local_timeout",
                self.wait_for_local_timeout.as_secs_f64(),
                "must be positive when wait_for_local is set",
            ));
        }
        if self.max_tiles < 1 {
            return Err(ConfigError::invalid("max_tiles", self.max_tiles, "must be at least 1"));
        }
        if let Some(bad) = self.multi_level_loads.iter().find(|o| **o > 0) {
            return Err(ConfigError::invalid(
                "multi_level_loads",
                bad,
                "offsets must be zero or negative",
            ));
        }
        if !(self.importance_scale > 0.0) || !self.importance_scale.is_finite() {
            return Err(ConfigError::invalid(
                "importance_scale",
                self.importance_scale,
                "must be positive",
            ));
        }
        if self.max_zoom > MAX_LEVEL as u32 {
            return Err(ConfigError::invalid(
                "max_zoom",
                self.max_zoom,
                format!("must be at most {}", MAX_LEVEL),
            ));
        }
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::invalid(
                "min_zoom",
                self.min_zoom,
                format!("must not exceed max_zoom ({})", self.max_zoom),
            ));
        }
        if !(self.min_importance >= 0.0) {
            return Err(ConfigError::invalid(
                "min_importance",
                self.min_importance,
                "must be non-negative",
            ));
        }
        Ok(())
    }

    // =========================================================================
    // INI persistence
    // =========================================================================

    /// Builds a configuration from the `[pager]` section of a parsed file.
    ///
    /// Missing keys keep their defaults. Unknown keys are an error.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(CONFIG_SECTION)) else {
            return Ok(config);
        };

        for (key, value) in section.iter() {
            let value = value.trim();
            match key {
                "max_simultaneous_fetches" => {
                    config.max_simultaneous_fetches = parse_value(key, value)?
                }
                "min_update_period" => config.min_update_period = parse_seconds(key, value)?,
                "min_update_distance" => config.min_update_distance = parse_value(key, value)?,
                "wait_for_local" => config.wait_for_local = parse_bool(key, value)?,
                "wait_for_local_timeout" => {
                    config.wait_for_local_timeout = parse_seconds(key, value)?
                }
                "max_tiles" => config.max_tiles = parse_value(key, value)?,
                "single_level_loading" => config.single_level_loading = parse_bool(key, value)?,
                "multi_level_loads" => config.multi_level_loads = parse_list(key, value)?,
                "importance_scale" => config.importance_scale = parse_value(key, value)?,
                "border_texel" => config.border_texel = parse_value(key, value)?,
                "flip_y" => config.flip_y = parse_bool(key, value)?,
                "min_zoom" => config.min_zoom = parse_value(key, value)?,
                "max_zoom" => config.max_zoom = parse_value(key, value)?,
                "min_importance" => config.min_importance = parse_value(key, value)?,
                "single_level" => config.single_level = parse_bool(key, value)?,
                "require_siblings" => config.require_siblings = parse_bool(key, value)?,
                other => return Err(ConfigError::UnknownKey(other.to_string())),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Serializes every value into a `[pager]` section.
    pub fn to_ini(&self) -> Ini {
        let loads = self
            .multi_level_loads
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let mut ini = Ini::new();
        ini.with_section(Some(CONFIG_SECTION))
            .set(
                "max_simultaneous_fetches",
                self.max_simultaneous_fetches.to_string(),
            )
            .set(
                "min_update_period",
                self.min_update_period.as_secs_f64().to_string(),
            )
            .set("min_update_distance", self.min_update_distance.to_string())
            .set("wait_for_local", self.wait_for_local.to_string())
            .set(
                "wait_for_local_timeout",
                self.wait_for_local_timeout.as_secs_f64().to_string(),
            )
            .set("max_tiles", self.max_tiles.to_string())
            .set("single_level_loading", self.single_level_loading.to_string())
            .set("multi_level_loads", loads)
            .set("importance_scale", self.importance_scale.to_string())
            .set("border_texel", self.border_texel.to_string())
            .set("flip_y", self.flip_y.to_string())
            .set("min_zoom", self.min_zoom.to_string())
            .set("max_zoom", self.max_zoom.to_string())
            .set("min_importance", self.min_importance.to_string())
            .set("single_level", self.single_level.to_string())
            .set("require_siblings", self.require_siblings.to_string());
        ini
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(io) => ConfigError::Io(io),
            ini::Error::Parse(parse) => ConfigError::Parse(parse.to_string()),
        })?;
        Self::from_ini(&ini)
    }

    /// Writes the configuration, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }
}

/// Default configuration file location (`<config dir>/quadpager/config.ini`).
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("quadpager").join("config.ini"))
}

// =============================================================================
// Value parsing
// =============================================================================

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(key, value, e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected true or false")),
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_value(key, value)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ConfigError::invalid(key, value, "expected a non-negative number of seconds"))
}

fn parse_list(key: &str, value: &str) -> Result<Vec<i32>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = PagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_simultaneous_fetches, 8);
        assert_eq!(config.min_update_period, Duration::from_millis(100));
        assert_eq!(config.importance_scale, 1.0);
        assert!(config.flip_y);
    }

    #[test]
    fn test_zero_fetches_rejected() {
        let config = PagerConfig::default().with_max_simultaneous_fetches(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "max_simultaneous_fetches"
        ));
    }

    #[test]
    fn test_positive_level_offset_rejected() {
        let config = PagerConfig::default().with_multi_level_loads(vec![-2, 1]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_zoom_range_rejected() {
        let config = PagerConfig::default().with_zoom_range(10, 4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_ini_reads_values() {
        let ini = Ini::load_from_str(
            "[pager]\n\
             max_simultaneous_fetches = 16\n\
             min_update_period = 0.25\n\
             wait_for_local = yes\n\
             multi_level_loads = -4, -2\n\
             single_level = true\n",
        )
        .unwrap();
        let config = PagerConfig::from_ini(&ini).unwrap();

        assert_eq!(config.max_simultaneous_fetches, 16);
        assert_eq!(config.min_update_period, Duration::from_millis(250));
        assert!(config.wait_for_local);
        assert_eq!(config.multi_level_loads, vec![-4, -2]);
        assert!(config.single_level);
        assert_eq!(config.max_tiles, DEFAULT_MAX_TILES);
    }

    #[test]
    fn test_from_ini_missing_section_uses_defaults() {
        let ini = Ini::load_from_str("[other]\nkey = value\n").unwrap();
        assert_eq!(PagerConfig::from_ini(&ini).unwrap(), PagerConfig::default());
    }

    #[test]
    fn test_from_ini_unknown_key() {
        let ini = Ini::load_from_str("[pager]\nmax_fetches = 3\n").unwrap();
        assert!(matches!(
            PagerConfig::from_ini(&ini),
            Err(ConfigError::UnknownKey(ref k)) if k == "max_fetches"
        ));
    }

    #[test]
    fn test_from_ini_bad_number() {
        let ini = Ini::load_from_str("[pager]\nmax_tiles = lots\n").unwrap();
        assert!(matches!(
            PagerConfig::from_ini(&ini),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_negative_period_rejected() {
        let ini = Ini::load_from_str("[pager]\nmin_update_period = -1\n").unwrap();
        assert!(PagerConfig::from_ini(&ini).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let config = PagerConfig::default()
            .with_max_tiles(300)
            .with_multi_level_loads(vec![-3, 0])
            .with_wait_for_local(true, Duration::from_millis(1500))
            .with_require_siblings(true);
        config.save(&path).unwrap();

        let loaded = PagerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = PagerConfig::load(&dir.path().join("absent.ini"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_config_file_path_ends_with_name() {
        if let Some(path) = config_file_path() {
            assert!(path.ends_with("quadpager/config.ini"));
        }
    }
}
