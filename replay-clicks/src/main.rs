use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;

use route_picker::http::{HttpNodeService, OverpassSource, DEFAULT_OVERPASS_URL};
use route_picker::session::{Input, LogRegionData, Session, SessionHandle};
use route_picker::{
    hit_test, project, ClickEvent, GeolocationError, PickerConfig, Position, ViewController,
};

#[derive(Parser)]
struct Args {
    /// Base URL of the routing service, which answers /nearest-node and /bounding-box
    #[arg(long)]
    service_url: String,

    /// Overpass API interpreter used to fetch the data around each start node
    #[arg(long, default_value = DEFAULT_OVERPASS_URL)]
    overpass_url: String,

    /// Path to a JSON list of clicks to replay
    #[arg(long)]
    clicks: String,

    /// Path to a JSON config file. Missing fields use the defaults.
    #[arg(long)]
    config: Option<String>,

    /// Pretend the device is at "lon,lat". Without this, geolocation is treated as denied.
    #[arg(long)]
    position: Option<String>,

    /// Output GeoJSON file to write
    #[arg(long, default_value = "selection.geojson")]
    output: String,

    /// Also request the street graph around each start node
    #[clap(long)]
    fetch_region_graph: bool,
}

#[derive(Deserialize)]
struct ScriptedClick {
    lon: f64,
    lat: f64,
    #[serde(default)]
    right_button: bool,
    /// If missing, hit-tested against the current selection
    layer: Option<String>,
    /// Pause after the click settles
    #[serde(default)]
    wait_ms: u64,
}

fn main() -> Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;
    let args = Args::parse();

    let mut config: PickerConfig = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)
            .with_context(|| format!("couldn't parse config {path}"))?,
        None => PickerConfig::default(),
    };
    if args.fetch_region_graph {
        config.fetch_region_graph = true;
    }
    let clicks: Vec<ScriptedClick> = serde_json::from_str(&std::fs::read_to_string(&args.clicks)?)
        .with_context(|| format!("couldn't parse clicks from {}", args.clicks))?;

    let mut view = ViewController::new(&config);
    let position = match &args.position {
        Some(raw) => Ok(parse_position(raw)?),
        None => Err(GeolocationError::PermissionDenied),
    };
    if let Some(transition) = view.on_position(position) {
        log::info!("Flying to {:?}", transition.target);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(replay(args, config, clicks))
}

async fn replay(args: Args, config: PickerConfig, clicks: Vec<ScriptedClick>) -> Result<()> {
    let mut handle = Session::spawn(
        config.clone(),
        Arc::new(HttpNodeService::new(args.service_url)),
        Arc::new(OverpassSource::new(args.overpass_url)),
        Box::new(LogRegionData),
    );

    for (idx, click) in clicks.into_iter().enumerate() {
        let layer = click.layer.or_else(|| {
            hit_test(&handle.snapshot().state, click.lon, click.lat).map(|x| x.to_string())
        });
        let sent = handle.send(Input::Click(ClickEvent {
            coordinate: [click.lon, click.lat],
            layer,
            right_button: click.right_button,
        }));
        if !sent {
            bail!("The session stopped before click {idx}");
        }

        let handled = idx as u64 + 1;
        handle
            .snapshots
            .wait_for(|s| s.inputs_handled >= handled && s.is_idle())
            .await?;
        print_feedback(&mut handle);
        if click.wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(click.wait_ms)).await;
        }
    }

    let snapshot = handle.snapshot();
    println!("Start node: {:?}", snapshot.state.start_node);
    println!("End node: {:?}", snapshot.state.end_node);

    // Render as if every fade has finished
    let layers = project(&snapshot.state, &config, f64::INFINITY);
    std::fs::write(
        &args.output,
        serde_json::to_string_pretty(&layers.to_geojson())?,
    )?;
    log::info!("Wrote {}", args.output);

    handle.shutdown().await;
    Ok(())
}

fn print_feedback(handle: &mut SessionHandle) {
    while let Ok(feedback) = handle.feedback.try_recv() {
        println!("{:?}: {}", feedback.level(), feedback);
    }
}

fn parse_position(raw: &str) -> Result<Position> {
    let Some((lon, lat)) = raw.split_once(',') else {
        bail!("--position should look like lon,lat, not {raw}");
    };
    Ok(Position {
        longitude: lon.trim().parse()?,
        latitude: lat.trim().parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        assert_eq!(
            parse_position("-0.127, 51.507").unwrap(),
            Position {
                longitude: -0.127,
                latitude: 51.507,
            }
        );
        assert!(parse_position("51.507").is_err());
        assert!(parse_position("a,b").is_err());
    }

    #[test]
    fn test_scripted_clicks() {
        let clicks: Vec<ScriptedClick> = serde_json::from_str(
            r#"[
                {"lon": -0.127, "lat": 51.507},
                {"lon": -0.12, "lat": 51.51, "right_button": true, "wait_ms": 500}
            ]"#,
        )
        .unwrap();
        assert!(!clicks[0].right_button);
        assert_eq!(clicks[0].layer, None);
        assert!(clicks[1].right_button);
        assert_eq!(clicks[1].wait_ms, 500);
    }
}
