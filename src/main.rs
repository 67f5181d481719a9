use anyhow::Context as _;
use kameo::Actor;
use siot_feed::config::FeedConfig;
use siot_feed::feed::{ConnectionManager, ConnectionManagerArgs, StartFeed};
use siot_feed::identity::IdentitySource;
use siot_feed::logging::init_subscriber;
use siot_feed::presentation::{StatusCue, StatusLight};
use siot_feed::sink::{ConsoleLog, MessageSink};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FeedConfig::load().context("loading SIOT_* configuration")?;
    init_subscriber(&config.log_level);

    let status = StatusLight::new();
    let mut cues = status.subscribe();
    tokio::spawn(async move {
        while cues.changed().await.is_ok() {
            match &*cues.borrow_and_update() {
                StatusCue::Live => info!("feed live"),
                StatusCue::Receiving => info!("feed receiving"),
                StatusCue::Offline { reason } => info!(reason = ?reason, "feed offline"),
            }
        }
    });

    let location = config.page_location();
    let mut console = ConsoleLog::stdout(location.channel_id().as_deref());
    console.clear();

    let mut args =
        ConnectionManagerArgs::new(config.endpoint_host(), location, console, status);
    args.connect_timeout = config.connect_timeout();
    let manager = ConnectionManager::spawn(args);
    manager
        .tell(StartFeed)
        .send()
        .await
        .map_err(|err| anyhow::anyhow!("starting live feed: {err:?}"))?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutting down");
    let _ = manager.stop_gracefully().await;
    manager.wait_for_shutdown().await;
    Ok(())
}
