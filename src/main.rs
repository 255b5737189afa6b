use clap::Parser;
use log::{error, info};

use aihub2yolo::{Args, ClassMap, Pipeline};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let class_map = match ClassMap::from_file(&args.classes) {
        Ok(map) => map,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };
    info!("Loaded {} target classes.", class_map.num_classes());

    let pipeline = match Pipeline::new(args.to_config(), class_map) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    // Skipped records are reported, not fatal; the run exits successfully
    // unless configuration or an escalated threshold aborted it.
    match pipeline.run() {
        Ok(_report) => {
            info!("Conversion process completed successfully.");
        }
        Err(e) => {
            error!("Run aborted: {e}");
            std::process::exit(1);
        }
    }
}
