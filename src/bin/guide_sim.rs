use anyhow::{anyhow, bail, Context};
use dermacapture::auto_capture::AutoCaptureListener;
use dermacapture::governor::{DeviceProfile, ThermalState};
use dermacapture::testing::{synthetic_lesion_frame, SyntheticLesion};
use dermacapture::{
    FrameOutcome, GuideArea, GuideConfig, GuidancePipeline, Frame, ResourceGovernor,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str = "Usage: guide-sim <command> [args]

Commands:
  analyze <image> [--guide x,y,w,h] [--config <file>] [--json]
  simulate [--frames <n>] [--interval <ms>] [--thermal <state>] [--config <file>] [--json]";

/// Side of the default guide as a fraction of the shorter frame side
const DEFAULT_GUIDE_FRACTION: f32 = 0.4;

struct ConsoleListener {
    json: bool,
}

impl AutoCaptureListener for ConsoleListener {
    fn on_countdown_tick(&self, remaining: u32) {
        if self.json {
            println!("{}", serde_json::json!({ "event": "tick", "remaining": remaining }));
        } else {
            println!("  countdown: {}", remaining);
        }
    }

    fn on_capture_triggered(&self) {
        if self.json {
            println!("{}", serde_json::json!({ "event": "captured" }));
        } else {
            println!("  captured!");
        }
    }

    fn on_countdown_cancelled(&self) {
        if self.json {
            println!("{}", serde_json::json!({ "event": "cancelled" }));
        } else {
            println!("  countdown cancelled");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dermacapture::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "analyze" => cmd_analyze(&args[2..]).await,
        "simulate" => cmd_simulate(&args[2..]).await,
        "--help" | "-h" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn parse_guide(value: &str) -> anyhow::Result<GuideArea> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid guide '{}'", value))?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 => Ok(GuideArea::new(*x, *y, *w, *h)),
        _ => bail!("guide must be x,y,w,h with positive width and height"),
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<GuideConfig> {
    match path {
        Some(path) => Ok(GuideConfig::load_from_file(path)?),
        None => Ok(GuideConfig::load_or_default()),
    }
}

fn build_pipeline(config: GuideConfig, json: bool) -> anyhow::Result<GuidancePipeline> {
    let governor = Arc::new(ResourceGovernor::new(
        config.performance.clone(),
        DeviceProfile::default(),
    )?);
    Ok(GuidancePipeline::new(
        config,
        governor,
        Arc::new(ConsoleListener { json }),
    )?)
}

/// A single still never completes a countdown, so none is started
fn still_image_config(mut config: GuideConfig) -> GuideConfig {
    config.auto_capture.enabled = false;
    config
}

fn print_outcome(outcome: &FrameOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }
    match outcome {
        FrameOutcome::Skipped { frame_index } => println!("frame {:>4}  skipped", frame_index),
        FrameOutcome::Processed(report) => {
            let v = &report.validation;
            println!(
                "frame {:>4}  {:<13} conf={:.2} dist={:>6.1} ratio={:.2} {:>5.1}ms  {}",
                report.frame_index,
                v.guide_state.as_str(),
                v.confidence,
                v.distance_from_center,
                v.mole_area_ratio,
                report.processing_time_ms,
                v.message
            );
        }
    }
    Ok(())
}

async fn cmd_analyze(args: &[String]) -> anyhow::Result<()> {
    let mut image_path = None;
    let mut guide = None;
    let mut config_path = None;
    let mut json = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--guide" => guide = Some(parse_guide(flag_value(args, &mut i, "--guide")?)?),
            "--config" => config_path = Some(flag_value(args, &mut i, "--config")?),
            "--json" => json = true,
            other if image_path.is_none() => image_path = Some(other.to_string()),
            other => bail!("unexpected argument '{}'", other),
        }
        i += 1;
    }

    let image_path = image_path.ok_or_else(|| anyhow!("image path required\n{}", USAGE))?;
    let image = image::open(&image_path)
        .with_context(|| format!("failed to open {}", image_path))?
        .to_rgb8();
    let frame = Frame::from_rgb_image(&image);
    let guide = guide.unwrap_or_else(|| GuideArea::centered(frame.size(), DEFAULT_GUIDE_FRACTION));

    let pipeline = build_pipeline(still_image_config(load_config(config_path)?), json)?;
    let outcome = pipeline.on_frame(&frame, &guide);
    print_outcome(&outcome, json)?;

    if !json {
        if let FrameOutcome::Processed(report) = &outcome {
            println!("{}", pipeline.validator().detailed_guidance_message(&report.validation));
        }
    }
    Ok(())
}

/// Lesion position and size for frame `i` of an approach: drift in from the
/// upper left and grow over the first third, then hold still.
fn approach_frame(i: u32, frames: u32) -> SyntheticLesion {
    let approach = (frames / 3).max(1);
    let t = (i as f32 / approach as f32).min(1.0);
    let lerp = |a: f32, b: f32| a + (b - a) * t;
    SyntheticLesion {
        center: (lerp(200.0, 320.0), lerp(160.0, 240.0)),
        radius: lerp(25.0, 65.0),
        seed: i as u64,
        ..Default::default()
    }
}

async fn cmd_simulate(args: &[String]) -> anyhow::Result<()> {
    let mut frames: u32 = 150;
    let mut interval_ms: u64 = 33;
    let mut thermal = ThermalState::None;
    let mut config_path = None;
    let mut json = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" => frames = flag_value(args, &mut i, "--frames")?.parse()?,
            "--interval" => interval_ms = flag_value(args, &mut i, "--interval")?.parse()?,
            "--thermal" => {
                let value = flag_value(args, &mut i, "--thermal")?;
                thermal = ThermalState::parse(value)
                    .ok_or_else(|| anyhow!("unknown thermal state '{}'", value))?;
            }
            "--config" => config_path = Some(flag_value(args, &mut i, "--config")?),
            "--json" => json = true,
            other => bail!("unexpected argument '{}'", other),
        }
        i += 1;
    }
    if frames == 0 {
        bail!("--frames must be at least 1");
    }

    let pipeline = build_pipeline(load_config(config_path)?, json)?;
    pipeline.governor().set_thermal_state(thermal);

    let spec = SyntheticLesion::default();
    let size = dermacapture::FrameSize::new(spec.width, spec.height);
    let guide = GuideArea::centered(size, DEFAULT_GUIDE_FRACTION);

    for i in 0..frames {
        let frame = synthetic_lesion_frame(&approach_frame(i, frames));
        print_outcome(&pipeline.on_frame(&frame, &guide), json)?;
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }

    while pipeline.auto_capture().is_counting() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let state = pipeline.governor().state();
    let captures = pipeline.auto_capture().trigger_count();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "event": "summary",
                "frames": frames,
                "captures": captures,
                "resource_state": *state,
            })
        );
    } else {
        println!(
            "{} frames, {} capture(s); thermal={} freq={:.2} roi={:.2} avg={:.1}ms",
            frames,
            captures,
            state.thermal_state,
            state.frequency_multiplier,
            state.roi_scale,
            state.average_frame_time_ms
        );
    }

    pipeline.cleanup();
    Ok(())
}
