use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;

use crate::{
    api_access::ApiAccessManager, config::Config, connection::ConnectionListener, session::Session,
};

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[arg(
        short,
        long,
        help = "The port or URL that the server should listen on. This overrides the value from the config file."
    )]
    pub listen_on: Option<String>,

    #[arg(
        short,
        long,
        help = "The path to the config file. The default is `config.toml`."
    )]
    pub config: Option<String>,
}

pub async fn start() -> anyhow::Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("VANTAGE_LOG")
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_cli_args(&cli)?);

    let access_mgr = Arc::new(ApiAccessManager::new(Arc::clone(&config)));

    let listener = ConnectionListener::bind(Arc::clone(&config)).await?;
    listener
        .listen(move |mut conn| {
            let access_mgr = Arc::clone(&access_mgr);
            let config = Arc::clone(&config);
            async move {
                conn.init(&access_mgr).await?;

                Session::new(conn, config).run().await
            }
        })
        .await;

    Ok(())
}
