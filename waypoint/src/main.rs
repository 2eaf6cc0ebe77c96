#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod render;
mod replay;

use std::io::Write;

use args::{Args, Command, RouteArgs};
use clap::Parser;
use waypoint_config::Config;
use waypoint_routing::{ClassificationHints, RouteRequest, SmartRouter};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    waypoint_telemetry::init(&config.telemetry, args.log_filter.as_deref())?;

    tracing::debug!(config_path = %args.config.display(), "starting waypoint");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Route(route) => run_route(config, &route, &mut out),
        Command::Classify { task, image, json } => run_classify(config, &task, image, json, &mut out),
        Command::Check { json } => run_check(config, json, &mut out),
        Command::Replay { script, json } => {
            let script = replay::Script::load(&script)?;
            replay::run(config, &script, json, &mut out)?;
            Ok(())
        }
    }
}

fn run_route(config: Config, args: &RouteArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let router = SmartRouter::new(config)?;
    waypoint_telemetry::attach(&router);

    let mut request = RouteRequest::new(args.task.as_str()).with_hints(ClassificationHints {
        has_images: args.image,
        ..ClassificationHints::default()
    });
    if let Some(ref model) = args.force_model {
        request = request.with_force_model(model.as_str());
    }
    if let Some(tier) = args.force_tier {
        request = request.with_force_tier(tier);
    }
    if let Some(ref provider) = args.prefer {
        request = request.with_preferred_provider(provider.as_str());
    }
    if let Some(tokens) = args.tokens {
        request = request.with_estimated_tokens(tokens);
    }

    let Some(decision) = router.route(&request)? else {
        anyhow::bail!("no healthy provider available");
    };

    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&decision)?)?;
    } else {
        write!(out, "{}", render::describe_decision(&decision))?;
    }
    Ok(())
}

fn run_classify(config: Config, task: &str, image: bool, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let router = SmartRouter::new(config)?;
    let hints = ClassificationHints {
        has_images: image,
        ..ClassificationHints::default()
    };
    let result = router.classify(task, Some(&hints));

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
    } else {
        write!(out, "{}", render::describe_classification(&result))?;
    }
    Ok(())
}

fn run_check(config: Config, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let router = SmartRouter::new(config)?;

    if json {
        writeln!(out, "{}", router.stats().to_json()?)?;
    } else {
        writeln!(out, "configuration ok")?;
        write!(out, "{}", router.format_stats())?;
    }
    Ok(())
}
