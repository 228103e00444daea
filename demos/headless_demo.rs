//! Headless demo broadcast server with animated content.
//!
//! Demonstrates running [`rfb_demoserver::DemoServer`] against a trivial
//! in-process upstream adapter (no real screen capture) that paints an
//! animated gradient and marks the whole framebuffer dirty on every
//! frame, exercising the fan-out path against any number of viewers.
//!
//! Usage:
//!   cargo run --example headless_demo

use rfb_demoserver::{DemoServer, ServerConfig, TestPatternUpstream, Upstream};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    const WIDTH: u16 = 640;
    const HEIGHT: u16 = 480;

    println!("Starting demo broadcast server on port 5950...");
    println!("Connect with a Veyon-compatible viewer, token: demo-token");

    let upstream = Arc::new(TestPatternUpstream::new(WIDTH, HEIGHT));
    let config = ServerConfig::new(5950, "127.0.0.1", 11100, "upstream-token", "demo-token")?;

    let server = DemoServer::bind(config, upstream.clone()).await?;
    let accept_loop = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            eprintln!("demo server stopped: {e}");
        }
    });

    println!("Server started, generating animated content. Press Ctrl+C to stop.");

    let mut frame: u32 = 0;
    loop {
        {
            let mut fb = upstream.framebuffer().write().await;
            let pattern: Vec<u32> = (0..u32::from(WIDTH) * u32::from(HEIGHT))
                .map(|i| {
                    let x = i % u32::from(WIDTH);
                    let y = i / u32::from(WIDTH);
                    let r = (x + frame) % 256;
                    let g = (y + frame) % 256;
                    let b = (frame / 2) % 256;
                    (r << 16) | (g << 8) | b
                })
                .collect();
            fb.write_rect(0, 0, WIDTH, HEIGHT, &pattern);
        }
        upstream.announce_change(0, 0, WIDTH, HEIGHT);

        frame = frame.wrapping_add(1);
        time::sleep(Duration::from_millis(33)).await;

        if frame % 300 == 0 {
            println!("frame {frame}");
        }
        if accept_loop.is_finished() {
            break;
        }
    }

    Ok(())
}
