use anyhow::Result;
use std::path::PathBuf;
use std::{env, process};
use vqa_server::config::Settings;
use vqa_server::server;
use vqa_server::util;
use vqa_server::vqa::Pipeline;

const USAGE: &str = "usage: ./vqa-server [config file]";

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

    server::start(&settings, port, pipeline)?.await?;
    Ok(())
}
