use clap::Parser;
use glossary_lib::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();
    glossary_lib::init_tracing(&config.log_dir())?;
    glossary_lib::run(config).await?;
    Ok(())
}
