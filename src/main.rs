use log::error;

use axpert_bridge::options::Options;
use axpert_bridge::prelude::Config;

#[tokio::main]
async fn main() {
    let options = Options::new();

    let config = Config::new(options.config_file.clone()).unwrap_or_else(|err| {
        axpert_bridge::init_logging("info");
        error!("Failed to load config: {:?}", err);
        std::process::exit(255);
    });

    axpert_bridge::init_logging(config.loglevel());

    // a lost connection ends up here too; whoever runs us decides on restarts
    if let Err(err) = axpert_bridge::app(options, config).await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
