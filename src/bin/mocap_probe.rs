//! One-shot check of a QTM server: reads the body list and the current frame
//! and prints every body's pose. Does not stream.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use mocap_relay::adapter::{FrameAdapter, Target};
use mocap_relay::position::PositionTransform;
use mocap_relay::qtm::QtmClient;
use mocap_relay::registry::BodyRegistry;
use mocap_relay::source::{Component, TrackingSource};

#[derive(Debug, Parser)]
struct Args {
    /// host:port of the RT server
    #[arg(default_value = "127.0.0.1:22223")]
    addr: String,

    /// Take control and start a new live measurement first
    #[arg(long)]
    new: bool,

    #[arg(long, default_value = "password")]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut client = QtmClient::connect(&args.addr, Duration::from_secs(5)).await?;
    println!("Connected: {}", args.addr);

    if args.new {
        client.take_control(&args.password).await?;
        let started = client.new_measurement().await;
        client.release_control().await?;
        started?;
    }

    let xml = client.get_parameters(&[Component::SixD]).await?;
    let registry = BodyRegistry::from_parameters(&xml)?;

    let frame = client
        .get_current_frame(&[Component::SixD, Component::Timecode])
        .await?;
    println!(
        "Frame {} - Body count: {} - Timecode: {:?}",
        frame.frame_number,
        frame.bodies.len(),
        frame.timecode
    );

    let adapter = FrameAdapter::new(Target::All, PositionTransform::identity());
    let adapted = adapter.adapt(&frame, &registry)?;
    for (body, pose) in adapted.poses() {
        if pose.valid {
            let [w, x, y, z] = pose.rotation.0;
            println!(
                "  {:<16} pos [{:>9.2}, {:>9.2}, {:>9.2}]  quat(wxyz) [{:.4}, {:.4}, {:.4}, {:.4}]",
                body, pose.position[0], pose.position[1], pose.position[2], w, x, y, z
            );
        } else {
            println!("  {:<16} not tracked", body);
        }
    }

    client.disconnect().await?;
    Ok(())
}
