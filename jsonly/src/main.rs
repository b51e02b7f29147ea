use clap::Parser;
use jsonly::{cli, telemetry, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install the default crypto provider for rustls
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = jsonly::config::Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry()?;
    tracing::debug!("{:?}", args);

    let Some(command) = args.command else {
        anyhow::bail!("No command given. Run with --help to list the available commands.");
    };

    let output = cli::execute(&command, &config).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
