use std::io;
use std::time::Duration;

use bytes::Bytes;
use sockprims_link::{
    CloseInfo, CloseKind, Link, LinkConfig, LinkContext, LinkError, LinkHandler, ReconnectPolicy,
};
use tokio::sync::mpsc;

use crate::cmd::{parse_duration, ConnectArgs};
use crate::exit::{
    io_error, link_error, CliError, CliResult, DATA_INVALID, FAILURE, INTERNAL, SUCCESS,
};
use crate::output::{print_message, OutputFormat};

/// Upper bound on waiting for the peer to close after we finish.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Event {
    Connected,
    Message(Bytes),
    Closed(CloseInfo),
}

/// Sends the greetings on every connect and forwards what the link reports.
struct Forwarder {
    events: mpsc::UnboundedSender<Event>,
    greetings: Vec<Vec<u8>>,
}

impl LinkHandler for Forwarder {
    fn on_connected(&mut self, ctx: &mut LinkContext<'_>) {
        for greeting in &self.greetings {
            if let Err(err) = ctx.send(greeting) {
                tracing::warn!(link = %ctx.id(), error = %err, "greeting not sent");
            }
        }
        let _ = self.events.send(Event::Connected);
    }

    fn on_message(&mut self, _ctx: &mut LinkContext<'_>, msg: Bytes) {
        let _ = self.events.send(Event::Message(msg));
    }

    fn on_broken(&mut self, ctx: &mut LinkContext<'_>, error: &io::Error) {
        tracing::warn!(link = %ctx.id(), %error, "link broken");
    }

    fn on_connect_failed(&mut self, ctx: &mut LinkContext<'_>, error: &io::Error) {
        tracing::warn!(link = %ctx.id(), %error, "connect failed");
    }

    fn on_closed(&mut self, _ctx: &mut LinkContext<'_>, info: CloseInfo) {
        let _ = self.events.send(Event::Closed(info));
    }
}

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let (framing, frame) = args.framing.resolve()?;
    let delay = parse_duration(&args.reconnect_delay)?;
    let mut policy = ReconnectPolicy::fixed(delay);
    if let Some(max) = args.max_attempts {
        policy = policy.with_max_attempts(max);
    }

    let config = LinkConfig {
        endpoint: args.addr,
        framing,
        frame,
        policy,
        reconnect: !args.no_reconnect,
    };
    let greetings = args.data.iter().map(|d| d.as_bytes().to_vec()).collect();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(drive(config, greetings, args.count, format))
}

async fn drive(
    config: LinkConfig,
    greetings: Vec<Vec<u8>>,
    count: Option<usize>,
    format: OutputFormat,
) -> CliResult<i32> {
    let peer = config.endpoint.to_string();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let link = Link::spawn(
        config,
        Forwarder {
            events: events_tx,
            greetings,
        },
    )
    .map_err(|err| link_error("link setup failed", err))?;
    link.connect()
        .await
        .map_err(|err| link_error("connect failed", err))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut received = 0usize;
    let outcome = loop {
        let event = tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!(link = %link.id(), "interrupted");
                break Ok(SUCCESS);
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break Err(CliError::new(INTERNAL, "link driver exited")),
            },
        };

        match event {
            Event::Connected => tracing::info!(link = %link.id(), %peer, "connected"),
            Event::Message(msg) => {
                print_message(&msg, &peer, format);
                received += 1;
                if count.is_some_and(|n| received >= n) {
                    let close = link.graceful_shutdown(false, true);
                    if tokio::time::timeout(CLOSE_GRACE, close).await.is_err() {
                        tracing::warn!(link = %link.id(), "peer did not close, forcing");
                    }
                    break Ok(SUCCESS);
                }
            }
            Event::Closed(info) => {
                tracing::debug!(
                    link = %link.id(),
                    kind = %info.kind,
                    reconnecting = info.reconnecting,
                    "closed"
                );
                if let Some(result) = closed_outcome(info) {
                    break result;
                }
            }
        }
    };

    let _ = link.stop().await;
    outcome
}

/// Exit status for a close, or `None` while a reconnect is pending.
fn closed_outcome(info: CloseInfo) -> Option<CliResult<i32>> {
    if info.reconnecting {
        return None;
    }
    Some(match info.kind {
        CloseKind::Requested | CloseKind::Graceful => Ok(SUCCESS),
        CloseKind::ReconnectExhausted => {
            Err(link_error("link closed", LinkError::ReconnectExhausted))
        }
        CloseKind::Violation => Err(CliError::new(
            DATA_INVALID,
            "link closed: peer violated the wire format",
        )),
        CloseKind::Broken => Err(CliError::new(FAILURE, "link closed: connection lost")),
        CloseKind::ConnectFailed => Err(CliError::new(FAILURE, "link closed: connect failed")),
    })
}
