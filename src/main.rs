use clap::Parser;
use growth_dashboard_lib::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    growth_dashboard_lib::run(config).await?;
    Ok(())
}
