//! indoor-nav - offline queries against a place's map graph.
//!
//! Localization needs the external feature models, so the binary only
//! covers the planner side:
//! - `destinations` lists the destinations of a floor
//! - `route` plans from a given floorplan pose to a destination
//! - `summary` prints map graph statistics

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use indoor_nav::atlas::FloorKey;
use indoor_nav::config::Config;
use indoor_nav::geometry::FloorPose;
use indoor_nav::io::PlaceData;
use indoor_nav::navigation::{instructions, TrajectoryPlanner};

#[derive(Parser, Debug)]
#[command(name = "indoor-nav", version, about = "Indoor multi-floor route planning")]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `io_root` from the configuration
    #[arg(long)]
    io_root: Option<PathBuf>,

    /// Override the place from the configuration
    #[arg(long)]
    place: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the destinations of a floor
    Destinations {
        #[arg(long)]
        building: String,
        #[arg(long)]
        floor: String,
    },
    /// Plan a route from a floorplan pose
    Route {
        #[arg(long)]
        building: String,
        #[arg(long)]
        floor: String,
        #[arg(long)]
        x: f64,
        #[arg(long)]
        y: f64,
        /// Heading in degrees (0 = up the floorplan)
        #[arg(long, default_value_t = 0.0)]
        heading: f64,
        /// Destination building (defaults to `--building`)
        #[arg(long)]
        to_building: Option<String>,
        /// Destination floor (defaults to `--floor`)
        #[arg(long)]
        to_floor: Option<String>,
        /// Destination id
        #[arg(long)]
        destination: String,
        /// Print the route as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print map graph statistics
    Summary,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("indoor_nav=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::load(path)?
        }
        None => Config::default(),
    };
    if let Some(root) = args.io_root {
        config.io_root = root;
    }
    if let Some(place) = args.place {
        config.location.place = place;
    }

    let graph = PlaceData::load_graph(&config)
        .with_context(|| format!("Failed to load map graph of {}", config.location.place))?;

    match args.command {
        Command::Destinations { building, floor } => {
            let key = FloorKey::new(building, floor);
            for dest in graph.destinations(&key)? {
                println!(
                    "{:>8}  {:<32} ({:.1}, {:.1})",
                    dest.id, dest.name, dest.location.x, dest.location.y
                );
            }
        }
        Command::Route {
            building,
            floor,
            x,
            y,
            heading,
            to_building,
            to_floor,
            destination,
            json,
        } => {
            let current = FloorKey::new(building, floor);
            let target = FloorKey::new(
                to_building.unwrap_or_else(|| current.building.clone()),
                to_floor.unwrap_or_else(|| current.floor.clone()),
            );
            let pose = FloorPose::new(x, y, heading);

            let planner = TrajectoryPlanner::new(Arc::new(graph));
            let selected = planner.select_destination(&target, &destination)?;
            let legs = planner.calculate_path(&current, &pose, &selected)?;
            if legs.is_empty() {
                println!("No path from {} to {} on {}", current, destination, target);
                return Ok(());
            }

            let steps = instructions(&pose, &legs);
            if json {
                let out = serde_json::json!({ "legs": legs, "instructions": steps });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for leg in &legs {
                    println!(
                        "{} {}: {} ({} points, {:.1} px)",
                        leg.building,
                        leg.floor,
                        leg.name,
                        leg.polyline.len(),
                        leg.length()
                    );
                }
                for step in &steps {
                    println!("  {}", step);
                }
            }
        }
        Command::Summary => {
            let planner = TrajectoryPlanner::new(Arc::new(graph));
            let graph = planner.graph();
            println!("Place {} ({:?})", graph.place, graph.root);
            for record in graph.floors() {
                println!(
                    "  {:<24} {:>4} destinations {:>4} waypoints {:>3} connectors  routable={}  scale={:?}",
                    record.key.to_string(),
                    record.destinations.len(),
                    record.waypoints.len(),
                    record.interwaypoints.len(),
                    record.is_routable(),
                    graph.scale(&record.key)
                );
            }
            println!(
                "{} connectors, {} path nodes",
                graph.connections().count(),
                planner.tables().num_nodes()
            );
        }
    }

    Ok(())
}
