//! Two nodes on an in-memory network exchanging pings.
//!
//! Run with `RUST_LOG=debug cargo run --example ping_pong` to see the
//! engine's per-message events.

use std::sync::Arc;

use swarmproto::{
    CorrelationId, Ed25519Signer, EngineConfig, MemoryNetwork, PeerId, PingProtocol, Signer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let network = MemoryNetwork::new();

    let mut nodes = Vec::new();
    for name in ["NodeA", "NodeB"] {
        let signer = Arc::new(Ed25519Signer::generate());
        let transport = Arc::new(network.join(PeerId::from(name), signer.public_key()));
        nodes.push(PingProtocol::start(transport, signer, EngineConfig::default())?);
    }
    let (node_b, handle_b) = nodes.pop().ok_or("missing NodeB")?;
    let (node_a, handle_a) = nodes.pop().ok_or("missing NodeA")?;

    let mut pongs = node_a.subscribe();
    node_a.flush().await?;

    let target = PeerId::from("NodeB");
    for (id, text) in ["hello", "are you there?", "bye"].into_iter().enumerate() {
        node_a.send_ping(text, CorrelationId::from(vec![id as u8]), &target)?;
    }

    for _ in 0..3 {
        let Some(pong) = pongs.recv().await else {
            break;
        };
        tracing::info!(
            correlation_id = %pong.correlation_id(),
            text = PingProtocol::pong_text(&pong)?,
            "pong received"
        );
    }

    drop(node_b);
    let b_stats = handle_b.stop().await;
    let a_stats = handle_a.stop().await;
    tracing::info!(
        answered = b_stats.requests_answered,
        delivered = a_stats.deliveries,
        "done"
    );
    Ok(())
}
