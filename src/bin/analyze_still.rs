//! analyze_still - one-shot analysis of a single image file
//!
//! Runs the configured backend once over a JPEG/PNG file and prints the
//! normalised detections as JSON. The gemini single-label queries are
//! available behind flags.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use sade_feed::clock::{Clock, SystemClock};
use sade_feed::detect::tolerate_malformed;
use sade_feed::detection::FeatureVectors;
use sade_feed::frame::fit_to;
use sade_feed::{display_order, Detection, FeedConfig, StillImage};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to analyze.
    image: Option<PathBuf>,
    /// Print only the hand gesture label (gemini backend).
    #[arg(long)]
    gesture: bool,
    /// Print only the facial expression label (gemini backend).
    #[arg(long)]
    emotion: bool,
    /// Run the backend connection test and exit.
    #[arg(long)]
    test_connection: bool,
    /// Print detections in display order instead of backend order.
    #[arg(long)]
    ranked: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = FeedConfig::load()?;
    let registry = config.build_backends()?;
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no inference backend configured"))?;

    if args.test_connection {
        let ok = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?
            .test_connection()?;
        println!("{}", serde_json::json!({ "backend": config.backend.as_str(), "connected": ok }));
        return Ok(());
    }

    let path = args
        .image
        .as_ref()
        .ok_or_else(|| anyhow!("an image path is required"))?;
    let image =
        image::open(path).with_context(|| format!("failed to load image {}", path.display()))?;
    let rgb = fit_to(&image, config.feed.still_width, config.feed.still_height);
    let captured_at = SystemClock.now_ms();
    let still = StillImage::encode(&rgb, config.feed.jpeg_quality, captured_at)?;

    if args.gesture || args.emotion {
        return single_label(&config, &still, args.gesture);
    }

    let result = backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?
        .analyze(&still);
    let raws = tolerate_malformed(result)?;
    let mut vectors = FeatureVectors::new(config.feed.vector_seed);
    let detections: Vec<Detection> = raws
        .into_iter()
        .map(|raw| Detection::from_raw(raw, captured_at, &config.feed.confidence, &mut vectors))
        .collect();
    let output = if args.ranked {
        serde_json::to_string_pretty(&display_order(&detections))?
    } else {
        serde_json::to_string_pretty(&detections)?
    };
    println!("{}", output);
    Ok(())
}

#[cfg(feature = "backend-gemini")]
fn single_label(config: &FeedConfig, still: &StillImage, gesture: bool) -> Result<()> {
    let mut backend = config.gemini_backend()?;
    let output = if gesture {
        serde_json::json!({ "gesture": backend.classify_gesture(still)?.as_str() })
    } else {
        serde_json::json!({ "emotion": backend.classify_emotion(still)?.as_str() })
    };
    println!("{}", output);
    Ok(())
}

#[cfg(not(feature = "backend-gemini"))]
fn single_label(_config: &FeedConfig, _still: &StillImage, _gesture: bool) -> Result<()> {
    Err(anyhow!("--gesture and --emotion require the backend-gemini feature"))
}
