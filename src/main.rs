use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use syn_acceptor::config::AcceptorConfig;
use syn_acceptor::context::ListenContext;
use syn_acceptor::counter::HalfOpenCounter;
use syn_acceptor::listen::ListenLoop;
use syn_acceptor::management::ShutdownSignal;
use syn_acceptor::mock::{MockFactory, MockNetworkStack};
use syn_acceptor::network::{OptionParser, Segment, SynOptions};

/// A fixed-MSS option parser, standing in for the real segment's option
/// bytes until this acceptor is wired to an actual network stack.
struct DefaultOptionParser;

impl OptionParser for DefaultOptionParser {
    fn parse_syn_options(&self, _segment: &dyn Segment) -> Option<SynOptions> {
        Some(SynOptions {
            mss: 1460,
            snd_wnd_scale: Some(7),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "syn_acceptor=info".into()),
        )
        .with_target(false)
        .with_line_number(true)
        .init();

    info!("Starting syn-acceptor v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("ACCEPTOR_CONFIG").unwrap_or_else(|_| "config.default".to_string());
    let config = match AcceptorConfig::from_file(&config_path) {
        Ok(loaded) => {
            info!(path = %config_path, "configuration loaded");
            loaded
        }
        Err(e) => {
            debug!(error = %e, path = %config_path, "no configuration file found, using defaults");
            AcceptorConfig::default()
        }
    };

    config.validate().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    info!(
        bind_address = %config.listen.bind_address,
        bind_port = config.listen.bind_port,
        half_open_threshold = config.listen.half_open_threshold,
        "listener configuration resolved"
    );

    let proto = config
        .protocol_family()
        .map_err(|e| anyhow::anyhow!(e))
        .context("resolving protocol family")?;

    let stack = Arc::new(MockNetworkStack::new());
    let factory = Arc::new(MockFactory::always_succeeds());
    let context = ListenContext::new(
        stack,
        factory,
        config.listen.rcv_wnd,
        proto,
        config.listen.v6_only,
        config.cookie.max_timestamp_diff,
    );
    let counter = Arc::new(HalfOpenCounter::new(config.listen.half_open_threshold));
    let options: Arc<dyn OptionParser> = Arc::new(DefaultOptionParser);

    let (listen_loop, mut accept_queue, _events) =
        ListenLoop::new(context, counter, options, config.listen.accept_queue_capacity);

    // No real segment source is wired up here — ingesting actual wire
    // traffic belongs to the network stack, which this binary only mocks.
    // Keeping the sender alive means the loop blocks on it rather than
    // exiting immediately, so it behaves like a running listener until
    // interrupted.
    let (_segment_tx, segment_rx) = tokio::sync::mpsc::channel(config.listen.accept_queue_capacity);
    let (shutdown, shutdown_rx) = ShutdownSignal::new();

    let loop_handle = tokio::spawn(listen_loop.run(segment_rx, shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("received interrupt, shutting down listener");
            shutdown.initiate_shutdown();
        }
        () = async {
            while let Some(endpoint) = accept_queue.recv().await {
                info!(id = ?endpoint.id(), "accepted connection");
            }
        } => {}
    }

    let _ = loop_handle.await;
    Ok(())
}
