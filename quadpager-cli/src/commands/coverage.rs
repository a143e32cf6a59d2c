//! `coverage` command: show the tiles chosen for a synthetic view.

use std::collections::BTreeMap;

use clap::Args;
use glam::DVec2;
use quadpager::importance::ScreenImportance;
use quadpager::quadtree::{ImportantNodeSet, QuadTree};
use quadpager::view::ViewState;

use super::common::Surface;
use crate::error::CliError;

/// Arguments for the coverage command.
#[derive(Debug, Args)]
pub struct CoverageArgs {
    /// Coarsest level considered
    #[arg(long, default_value_t = 0)]
    pub min_zoom: i32,

    /// Finest level considered
    #[arg(long, default_value_t = 10)]
    pub max_zoom: i32,

    /// Cap on the number of nodes returned
    #[arg(long, default_value_t = 128)]
    pub max_nodes: usize,

    /// Minimum on-screen importance (pixels squared)
    #[arg(long, default_value_t = 256.0 * 256.0)]
    pub min_importance: f64,

    /// Load all four children of a node or none
    #[arg(long)]
    pub siblings: bool,

    /// Single-level coverage instead of a pyramid
    #[arg(long)]
    pub visible: bool,

    /// Camera height above the surface in display units
    #[arg(long, default_value_t = 1.0)]
    pub height: f64,

    /// Camera target X in local coordinates
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub x: f64,

    /// Camera target Y in local coordinates
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub y: f64,

    /// Frame buffer size in pixels
    #[arg(long, default_value_t = 1024.0)]
    pub frame: f64,

    /// Display surface
    #[arg(long, value_enum, default_value_t = Surface::Flat)]
    pub surface: Surface,

    /// Print every node, not just per-level counts
    #[arg(long)]
    pub list: bool,
}

/// Run the coverage command.
pub fn run(args: CoverageArgs) -> Result<(), CliError> {
    if args.min_zoom < 0 || args.max_zoom < args.min_zoom {
        return Err(CliError::InvalidArgument(format!(
            "zoom range {}..{} is empty",
            args.min_zoom, args.max_zoom
        )));
    }
    if args.height <= 0.0 {
        return Err(CliError::InvalidArgument("height must be positive".to_string()));
    }

    let coord = args.surface.coord_system();
    let view = ViewState::top_down(
        coord.as_ref(),
        DVec2::new(args.x, args.y),
        args.height,
        DVec2::splat(args.frame),
    );
    let tree = QuadTree::new(coord.bounds(), args.min_zoom, args.max_zoom);
    let source = ScreenImportance::new(coord.as_ref(), &view, 1.0);
    let thresholds = [args.min_importance];

    let nodes = if args.visible {
        let (target, nodes) = tree.calc_coverage_visible(&source, &thresholds, args.max_nodes, &[]);
        println!("Target level: {}", target);
        nodes
    } else {
        tree.calc_coverage_importance(&source, &thresholds, args.max_nodes, args.siblings)
    };

    print_summary(&nodes);
    if args.list {
        println!();
        for node in &nodes {
            println!("  {}  importance {:.0}", node.node, node.importance);
        }
    }
    Ok(())
}

fn print_summary(nodes: &ImportantNodeSet) {
    let mut per_level: BTreeMap<i32, usize> = BTreeMap::new();
    for node in nodes {
        *per_level.entry(node.node.level).or_default() += 1;
    }

    println!("Coverage: {} nodes", nodes.len());
    for (level, count) in per_level {
        println!("  level {:>2}: {}", level, count);
    }
}
