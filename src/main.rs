mod app;
mod gui;
mod io;
mod shap;
mod tree;
mod tutorial;
mod ui;

use app::{AppConfig, RevealTreeApp};
use clap::Parser;

fn main() {
    let _ = env_logger::builder().format_timestamp(None).try_init();

    let config = AppConfig::parse();
    if let Err(err) = RevealTreeApp::run(&config) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
