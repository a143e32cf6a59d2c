//! Common types and utilities shared across CLI commands.

use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use quadpager::config::{config_file_path, PagerConfig};
use quadpager::coord::{CoordSystem, FlatCoordSystem, SphericalMercator};

use crate::error::CliError;

/// Display surface selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Surface {
    /// Flat Web Mercator map
    Flat,
    /// Spherical Mercator globe
    Globe,
}

impl Surface {
    pub fn coord_system(self) -> Arc<dyn CoordSystem> {
        match self {
            Surface::Flat => Arc::new(FlatCoordSystem::web_mercator()),
            Surface::Globe => Arc::new(SphericalMercator::new()),
        }
    }
}

/// Resolve the pager configuration.
///
/// An explicit path must exist. Otherwise the user config file is used if
/// present, then built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<PagerConfig, CliError> {
    if let Some(path) = path {
        return Ok(PagerConfig::load(path)?);
    }
    match config_file_path() {
        Some(path) if path.exists() => Ok(PagerConfig::load(&path)?),
        _ => Ok(PagerConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        PagerConfig::default().with_max_tiles(7).save(&path).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_tiles, 7);
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ini");
        assert!(matches!(load_config(Some(&path)), Err(CliError::Config(_))));
    }

    #[test]
    fn test_surface_coord_systems() {
        assert!(Surface::Flat.coord_system().is_flat());
        assert!(!Surface::Globe.coord_system().is_flat());
    }
}
