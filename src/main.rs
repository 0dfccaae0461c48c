//! BiMoType peer node
//!
//! Listens for peers, publishes its fingerprint to the discovery cache, and
//! optionally handshakes with and messages one target fingerprint.

use bimotype::{
    BimoCodec, FileDiscovery, Fingerprint, HardwareIdentity, NetEvent, NodeConfig, PeerNode,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "bimotype", version, about = "BiMoType peer node")]
struct Args {
    /// Listen port
    #[arg(short, long, default_value = "5005")]
    port: u16,

    /// Shared discovery cache
    #[arg(short, long, default_value = "peer_cache.json")]
    discovery_file: PathBuf,

    /// Host registered in the discovery cache
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Trust every handshake requester
    #[arg(long)]
    auto_accept: bool,

    /// Fingerprint to handshake with (resolved through discovery)
    #[arg(short, long)]
    connect: Option<String>,

    /// Message sent to --connect once it trusts us
    #[arg(short, long, requires = "connect")]
    send: Option<String>,

    /// Decoder noise level
    #[arg(long, default_value = "0.0")]
    noise: f64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bimotype=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = NodeConfig {
        listen_port: args.port,
        auto_accept_handshakes: args.auto_accept,
        ..Default::default()
    };

    let discovery = Arc::new(FileDiscovery::new(&args.discovery_file));
    let codec = Arc::new(BimoCodec::with_noise(args.noise));
    if codec.noise_level() > 0.0 {
        info!("Decoder noise level: {}", codec.noise_level());
    }
    let (node, mut event_rx) = PeerNode::new(config, &HardwareIdentity::new(), codec, discovery);

    let fingerprint = match node.start_listening().await {
        Ok(fp) => fp,
        Err(e) => {
            error!("Failed to start node: {}", e);
            return;
        }
    };

    if let Err(e) = node.register_self(&args.host).await {
        warn!("Failed to register in discovery: {}", e);
    }

    info!("Fingerprint: {}", fingerprint);
    info!("Press Ctrl+C to stop.");

    let target = args.connect.map(Fingerprint::from);
    if let Some(target) = &target {
        if !node.connect_to(target).await {
            warn!("Handshake request to {} not delivered", target.short());
        }
    }
    let mut outgoing = args.send;

    tokio::select! {
        _ = async {
            while let Some(event) = event_rx.recv().await {
                match event {
                    NetEvent::MessageReceived { sender, message } => {
                        info!(
                            "[{}] {} (fidelity {:.3})",
                            sender.short(),
                            message.text,
                            message.fidelity
                        );
                    }
                    NetEvent::HandshakeRequested { sender, reply_to } => {
                        // Requests from the peer we dialed complete the mutual handshake
                        if target.as_ref() == Some(&sender) {
                            node.accept_handshake(&sender).await;
                        } else {
                            info!(
                                "Pending handshake from {} at {} (restart with --auto-accept to trust requesters)",
                                sender.short(),
                                reply_to
                            );
                        }
                    }
                    NetEvent::PeerTrusted(peer) => {
                        info!("Peer {} trusted", peer.short());
                        if target.as_ref() == Some(&peer) {
                            if let Some(message) = outgoing.take() {
                                if !node.send_to(&peer, &message).await {
                                    warn!("Message to {} not delivered", peer.short());
                                }
                            }
                        }
                    }
                }
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    node.stop().await;
}
