//! Entrypoint that also exposes the server through a public ngrok tunnel

use anyhow::Result;
use std::path::PathBuf;
use std::{env, process};
use tracing::error;
use vqa_server::config::Settings;
use vqa_server::server;
use vqa_server::tunnel::Tunnel;
use vqa_server::util;
use vqa_server::vqa::Pipeline;

const USAGE: &str = "usage: ./vqa-tunnel [config file]";

fn get_args() -> Option<PathBuf> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        println!("{USAGE}");
        process::exit(1);
    }

    args.get(1).map(PathBuf::from)
}

#[actix_web::main]
async fn main() -> Result<()> {
    let config_file = get_args();
    let settings = Settings::load(config_file.as_deref())?;
    util::init_tracing(&settings.log_level);

    let port = util::resolve_port(settings.port)?;
    let pipeline = Pipeline::load(&settings.model)?;

    let server = server::start(&settings, port, pipeline)?;
    let handle = server.handle();
    let running = actix_web::rt::spawn(server);

    let tunnel = match Tunnel::open(&settings.tunnel, port).await {
        Ok(tunnel) => tunnel,
        Err(e) => {
            error!("failed to open tunnel: {e:#}");
            handle.stop(true).await;
            return Err(e);
        }
    };
    println!("Public URL: {}", tunnel.public_url());

    running.await??;
    drop(tunnel);
    Ok(())
}
