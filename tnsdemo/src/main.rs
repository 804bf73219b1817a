use tnsdemo::{AppConfig, Cli, impls};
use tracing::{Level, event};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Audit events own stdout, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::import()?;
    let config = AppConfig::load(&cli)?;

    if cli.dump_config {
        serde_json::to_writer_pretty(std::io::stdout(), &config)?;
        return Ok(());
    }

    let simulation = config.simulation.clone();
    let start = simulation.start()?;
    let audit = impls::JsonLines::new(std::io::stdout().lock());
    let mut node = impls::build_node(&config, audit, start)?;

    simulation
        .run(start, |now| {
            node.tick(now);
            // The simulated neighbors never reply
            for (neighbor, records) in node.transport_mut().drain() {
                event!(
                    Level::DEBUG,
                    neighbor = %neighbor,
                    count = records.len(),
                    "signal sent"
                );
            }
            Ok::<(), anyhow::Error>(())
        })
        .await?;

    impls::report(&node);
    Ok(())
}
