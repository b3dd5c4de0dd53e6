use pulselink::client::Transport;
use pulselink::config::load_config;
use pulselink::utils::logging;

#[tokio::main]
async fn main() {
    let settings = load_config().expect("Failed to load configuration");
    logging::init(&settings.logging);

    let transport = Transport::new(settings.transport);
    let mut events = transport.events();

    let _all = transport.subscribe("*", |msg| {
        tracing::info!(kind = %msg.kind, id = %msg.id, "message received");
    });

    if let Err(e) = transport.connect().await {
        tracing::error!("initial connect failed: {e}");
        return;
    }

    while let Ok(event) = events.recv().await {
        tracing::info!(?event, "transport event");
    }
}
