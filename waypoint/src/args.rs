use std::path::PathBuf;

use clap::{Parser, Subcommand};
use waypoint_routing::ModelTier;

/// Waypoint model router
#[derive(Debug, Parser)]
#[command(name = "waypoint", about = "Resilient provider and model routing for LLM tasks")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "waypoint.toml", env = "WAYPOINT_CONFIG")]
    pub config: PathBuf,

    /// Override the configured log filter
    #[arg(long, env = "WAYPOINT_LOG")]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Route a single task and print the decision
    Route(RouteArgs),
    /// Classify a task without routing it
    Classify {
        /// Task description
        task: String,
        /// The task comes with image input
        #[arg(long)]
        image: bool,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and print the resolved chain
    Check {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run a scripted sequence of requests and outcomes against a simulated clock
    Replay {
        /// Path to the replay script
        script: PathBuf,
        /// Print one JSON object per line instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, clap::Args)]
pub struct RouteArgs {
    /// Task description
    pub task: String,

    /// Use exactly this model
    #[arg(long)]
    pub force_model: Option<String>,

    /// Use this tier: mini, standard, reasoning or vision
    #[arg(long)]
    pub force_tier: Option<ModelTier>,

    /// Prefer this provider when it is healthy
    #[arg(long)]
    pub prefer: Option<String>,

    /// Expected token count, enables cost estimation
    #[arg(long)]
    pub tokens: Option<u64>,

    /// The task comes with image input
    #[arg(long)]
    pub image: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}
