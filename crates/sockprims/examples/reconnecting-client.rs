//! Client that keeps a link to the echo server alive across restarts.
//!
//! Run the echo server, then:
//!   cargo run --example reconnecting-client
//!
//! Stop and restart the server to watch the link reconnect. Ctrl-C exits.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use sockprims::link::{
    BackoffConfig, CloseInfo, Link, LinkConfig, LinkContext, LinkHandler, ReconnectPolicy,
    TimerId,
};

struct Pinger {
    sent: u64,
}

impl LinkHandler for Pinger {
    fn on_connected(&mut self, ctx: &mut LinkContext<'_>) {
        eprintln!("{} connected", ctx.id());
        if let Err(e) = ctx.set_timer(TimerId::Heartbeat, Duration::from_secs(1), true) {
            eprintln!("timer not armed: {e}");
        }
    }

    fn on_message(&mut self, ctx: &mut LinkContext<'_>, msg: Bytes) {
        eprintln!("{} echoed {:?}", ctx.id(), String::from_utf8_lossy(&msg));
    }

    fn on_broken(&mut self, ctx: &mut LinkContext<'_>, error: &io::Error) {
        eprintln!("{} broken: {error}", ctx.id());
    }

    fn on_closed(&mut self, ctx: &mut LinkContext<'_>, info: CloseInfo) {
        eprintln!(
            "{} closed ({}), reconnecting: {}",
            ctx.id(),
            info.kind,
            info.reconnecting
        );
    }

    fn on_timer(&mut self, ctx: &mut LinkContext<'_>, _id: TimerId) {
        self.sent += 1;
        let msg = format!("ping {}", self.sent);
        if let Err(e) = ctx.send(msg.as_bytes()) {
            eprintln!("send failed: {e}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = LinkConfig {
        policy: ReconnectPolicy::backoff(BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }),
        ..LinkConfig::default()
    };
    let link = Link::spawn(config, Pinger { sent: 0 })?;
    link.connect().await?;

    tokio::signal::ctrl_c().await?;
    link.graceful_shutdown(false, false).await?;
    link.stop().await?;
    Ok(())
}
