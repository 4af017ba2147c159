use envconfig::Envconfig;
use gamely_operator::{init_tracing, run_all, OperatorConfig};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = OperatorConfig::init_from_env()?;
    init_tracing(&cfg.log);
    cfg.validate()?;
    info!(?cfg, "Starting gamely operator");

    let client = Client::try_default().await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "Cannot listen for shutdown signal"),
        }
    });

    run_all(client, cfg, cancel).await?;
    Ok(())
}
