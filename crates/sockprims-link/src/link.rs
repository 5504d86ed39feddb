//! Tokio driver for a [`LinkMachine`].
//!
//! One driver task per link owns the machine, the handler, the timers and the
//! framing state. The connect attempt, the reader and the writer each run in
//! their own task and report back through an event channel, tagged with the
//! epoch they were started under.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use sockprims_frame::{
    AsyncFrameReader, AsyncFrameWriter, FrameConfig, FrameError, Framing, Packer, Unpacker,
};
use sockprims_transport::{connect_async, Endpoint, TransportError};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{LinkError, Result};
use crate::handler::{enqueue, LinkContext, LinkHandler};
use crate::machine::{Action, LinkMachine, Notification, ReadEnd};
use crate::policy::ReconnectPolicy;
use crate::state::LinkState;
use crate::timer::{TimerId, TimerSet};

const COMMAND_QUEUE: usize = 64;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique link identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    fn next() -> Self {
        Self(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Configuration for one link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Target endpoint; re-resolved on every attempt.
    pub endpoint: Endpoint,
    pub framing: Framing,
    pub frame: FrameConfig,
    pub policy: ReconnectPolicy,
    /// Initial reconnect flag. Default: true.
    pub reconnect: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            framing: Framing::default(),
            frame: FrameConfig::default(),
            policy: ReconnectPolicy::default(),
            reconnect: true,
        }
    }
}

/// Entry point for starting link drivers.
#[derive(Debug)]
pub struct Link;

impl Link {
    /// Validate `config` and start a driver task for it.
    ///
    /// The link starts `Idle`; call [`LinkHandle::connect`] to open it. The
    /// driver stops on [`LinkHandle::stop`] or once every handle is dropped.
    /// Must be called from within a tokio runtime.
    pub fn spawn<H: LinkHandler>(config: LinkConfig, handler: H) -> Result<LinkHandle> {
        let unpacker = Unpacker::new(&config.framing, &config.frame)?;
        let packer = Packer::new(&config.framing, &config.frame)?;

        let id = LinkId::next();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);

        let driver = Driver {
            id,
            machine: LinkMachine::new(config.policy.clone(), config.reconnect),
            handler,
            timers: TimerSet::new(),
            packer,
            spare: Some(unpacker),
            stream: None,
            write_tx: None,
            writer: None,
            connecting: None,
            read_cancel: None,
            events_tx,
            state_tx,
            close_waiters: Vec::new(),
            config,
        };
        debug!(
            link = %id,
            endpoint = %driver.config.endpoint,
            framing = driver.config.framing.name(),
            "link spawned"
        );
        tokio::spawn(driver.run(commands_rx, events_rx));

        Ok(LinkHandle {
            id,
            commands: commands_tx,
            state: state_rx,
        })
    }
}

/// Cloneable control handle for a running link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    id: LinkId,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<LinkState>,
}

impl LinkHandle {
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Last state published by the driver.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Wait until the published state satisfies `pred`.
    pub async fn wait_for(&self, pred: impl FnMut(&LinkState) -> bool) -> Result<LinkState> {
        let mut state = self.state.clone();
        let seen = state.wait_for(pred).await.map_err(|_| LinkError::Stopped)?;
        Ok(*seen)
    }

    /// Start a connect attempt. Returns once the attempt has begun.
    pub async fn connect(&self) -> Result<()> {
        self.request(Op::Connect).await
    }

    /// Tear the link down without flushing queued output.
    pub async fn force_shutdown(&self, reconnect: bool) -> Result<()> {
        self.request(Op::ForceShutdown { reconnect }).await
    }

    /// Same as [`LinkHandle::force_shutdown`].
    pub async fn disconnect(&self, reconnect: bool) -> Result<()> {
        self.force_shutdown(reconnect).await
    }

    /// Flush, shut the write side down and let the peer close.
    ///
    /// With `synchronous` the call returns once the link has reached
    /// `Closed`; otherwise once the shutdown has started.
    pub async fn graceful_shutdown(&self, reconnect: bool, synchronous: bool) -> Result<()> {
        self.request(Op::GracefulShutdown {
            reconnect,
            synchronous,
        })
        .await
    }

    /// Return a closed link to `Idle`, clearing framing state and timers.
    pub async fn reset(&self) -> Result<()> {
        self.request(Op::Reset).await
    }

    pub async fn open_reconnect(&self) -> Result<()> {
        self.request(Op::SetReconnect(true)).await
    }

    pub async fn close_reconnect(&self) -> Result<()> {
        self.request(Op::SetReconnect(false)).await
    }

    /// Frame and queue one message. Fails unless the link is `Connected`.
    pub async fn send(&self, msg: impl Into<Bytes>) -> Result<()> {
        self.request(Op::Send(msg.into())).await
    }

    /// Close the link without reconnect and stop the driver.
    pub async fn stop(&self) -> Result<()> {
        self.request(Op::Stop).await
    }

    async fn request(&self, op: Op) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command { op, reply })
            .await
            .map_err(|_| LinkError::Stopped)?;
        response.await.map_err(|_| LinkError::Stopped)?
    }
}

#[derive(Debug)]
struct Command {
    op: Op,
    reply: oneshot::Sender<Result<()>>,
}

type Reply = (oneshot::Sender<Result<()>>, Result<()>);

#[derive(Debug)]
enum Op {
    Connect,
    ForceShutdown { reconnect: bool },
    GracefulShutdown { reconnect: bool, synchronous: bool },
    Reset,
    SetReconnect(bool),
    Send(Bytes),
    Stop,
}

/// Work for the writer task.
#[derive(Debug)]
pub(crate) enum WriteCmd {
    /// Already framed bytes.
    Send(Bytes),
    Shutdown,
}

enum Event {
    Connected {
        epoch: u64,
        result: io::Result<TcpStream>,
    },
    Inbound {
        epoch: u64,
        messages: Vec<Bytes>,
    },
    ReadEnded {
        epoch: u64,
        end: ReadEnd,
        unpacker: Unpacker,
    },
    WriteFailed {
        epoch: u64,
        error: io::Error,
    },
    WriteShutdown {
        epoch: u64,
        result: io::Result<()>,
    },
    TimerFired {
        id: TimerId,
        epoch: u64,
    },
}

struct Driver<H> {
    id: LinkId,
    config: LinkConfig,
    machine: LinkMachine,
    handler: H,
    timers: TimerSet,
    packer: Packer,
    /// Decoder waiting for the next connection. The reader task owns it while
    /// a connection is open.
    spare: Option<Unpacker>,
    stream: Option<TcpStream>,
    write_tx: Option<mpsc::UnboundedSender<WriteCmd>>,
    writer: Option<JoinHandle<()>>,
    connecting: Option<JoinHandle<()>>,
    read_cancel: Option<CancellationToken>,
    events_tx: mpsc::UnboundedSender<Event>,
    state_tx: watch::Sender<LinkState>,
    /// Callers of a synchronous graceful shutdown, answered on `Closed`.
    close_waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl<H: LinkHandler> Driver<H> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            let reply = tokio::select! {
                biased;

                Some(event) = events.recv() => {
                    self.on_event(event);
                    None
                }

                command = commands.recv() => match command {
                    Some(Command { op: Op::Stop, reply }) => {
                        self.stop();
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => self.on_command(command),
                    None => {
                        debug!(link = %self.id, "all handles dropped");
                        self.stop();
                        break;
                    }
                },
            };
            self.pump();
            if let Some((reply, result)) = reply {
                let _ = reply.send(result);
            }
        }
        debug!(link = %self.id, "link driver stopped");
    }

    fn stop(&mut self) {
        self.machine.force_shutdown(false);
        self.pump();
        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(Err(LinkError::Stopped));
        }
    }

    /// Apply a command. The reply is returned so it goes out after the
    /// resulting actions have run; `None` parks it until the link closes.
    fn on_command(&mut self, Command { op, reply }: Command) -> Option<Reply> {
        let result = match op {
            Op::Connect => self.machine.connect(),
            Op::ForceShutdown { reconnect } => {
                self.machine.force_shutdown(reconnect);
                Ok(())
            }
            Op::GracefulShutdown {
                reconnect,
                synchronous,
            } => {
                self.machine.graceful_shutdown(reconnect);
                if synchronous && self.machine.state() == LinkState::GracefulClosing {
                    self.close_waiters.push(reply);
                    return None;
                }
                Ok(())
            }
            Op::Reset => self.machine.reset(),
            Op::SetReconnect(true) => {
                self.machine.open_reconnect();
                Ok(())
            }
            Op::SetReconnect(false) => {
                self.machine.close_reconnect();
                Ok(())
            }
            Op::Send(msg) => enqueue(&self.machine, &self.packer, self.write_tx.as_ref(), &msg),
            Op::Stop => Ok(()),
        };
        Some((reply, result))
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Connected { epoch, result } => {
                let (status, stream) = match result {
                    Ok(stream) => (Ok(()), Some(stream)),
                    Err(err) => (Err(err), None),
                };
                if self.machine.handle_connect_complete(epoch, status) {
                    self.stream = stream;
                }
            }
            Event::Inbound { epoch, messages } => {
                for msg in messages {
                    if !self.machine.accepts_inbound(epoch) {
                        trace!(link = %self.id, epoch, "dropping inbound after shutdown");
                        break;
                    }
                    let mut ctx = LinkContext::new(
                        self.id,
                        &mut self.machine,
                        &self.packer,
                        self.write_tx.as_ref(),
                    );
                    self.handler.on_message(&mut ctx, msg);
                }
            }
            Event::ReadEnded {
                epoch,
                end,
                unpacker,
            } => {
                self.spare = Some(unpacker);
                self.machine.handle_read_end(epoch, end);
            }
            Event::WriteFailed { epoch, error } => self.machine.handle_write_failed(epoch, error),
            Event::WriteShutdown { epoch, result } => {
                self.machine.handle_write_shutdown(epoch, result)
            }
            Event::TimerFired { id, epoch } => self.machine.handle_timer(id, epoch),
        }
    }

    /// Execute queued actions until the machine is quiet, then publish the state.
    fn pump(&mut self) {
        while let Some(action) = self.machine.poll_action() {
            self.execute(action);
        }
        self.state_tx.send_replace(self.machine.state());
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::Connect { epoch } => self.start_connect(epoch),
            Action::StartReading { epoch } => self.start_io(epoch),
            Action::ShutdownWrite { epoch } => {
                let sent = self
                    .write_tx
                    .take()
                    .is_some_and(|tx| tx.send(WriteCmd::Shutdown).is_ok());
                if !sent {
                    let err = io::Error::from(io::ErrorKind::BrokenPipe);
                    self.machine.handle_write_shutdown(epoch, Err(err));
                }
            }
            Action::CloseTransport => self.close_transport(),
            Action::ArmTimer {
                id,
                delay,
                periodic,
                epoch,
            } => {
                let events = self.events_tx.clone();
                self.timers.arm(id, delay, move |id| {
                    events.send(Event::TimerFired { id, epoch }).is_ok() && periodic
                });
            }
            Action::CancelTimer(id) => self.timers.cancel(id),
            Action::CancelTimers => self.timers.cancel_all(),
            Action::ResetFraming => {
                if let Some(unpacker) = self.spare.as_mut() {
                    unpacker.reset();
                }
            }
            Action::Notify(notification) => self.notify(notification),
        }
    }

    fn notify(&mut self, notification: Notification) {
        let mut ctx = LinkContext::new(
            self.id,
            &mut self.machine,
            &self.packer,
            self.write_tx.as_ref(),
        );
        match notification {
            Notification::Connected => self.handler.on_connected(&mut ctx),
            Notification::ConnectFailed(err) => self.handler.on_connect_failed(&mut ctx, &err),
            Notification::Broken(err) => self.handler.on_broken(&mut ctx, &err),
            Notification::Timer(id) => self.handler.on_timer(&mut ctx, id),
            Notification::Closed(info) => {
                self.handler.on_closed(&mut ctx, info);
                self.state_tx.send_replace(self.machine.state());
                for waiter in self.close_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
        }
    }

    fn start_connect(&mut self, epoch: u64) {
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        let endpoint = self.config.endpoint.clone();
        let events = self.events_tx.clone();
        debug!(link = %self.id, epoch, %endpoint, "connect attempt");
        self.connecting = Some(tokio::spawn(async move {
            let result = connect_async(&endpoint)
                .await
                .map_err(TransportError::into_io);
            let _ = events.send(Event::Connected { epoch, result });
        }));
    }

    fn start_io(&mut self, epoch: u64) {
        let Some(stream) = self.stream.take() else {
            warn!(link = %self.id, epoch, "no stream to read from");
            return;
        };
        if let Err(err) = self.machine.begin_read() {
            warn!(link = %self.id, epoch, error = %err, "read not started");
            return;
        }
        let unpacker = match self.take_unpacker() {
            Ok(unpacker) => unpacker,
            Err(err) => {
                self.machine.handle_read_end(epoch, ReadEnd::Violation(err));
                return;
            }
        };
        let (read_half, write_half) = stream.into_split();

        let cancel = CancellationToken::new();
        self.read_cancel = Some(cancel.clone());
        let reader = AsyncFrameReader::with_unpacker(read_half, unpacker, &self.config.frame);
        tokio::spawn(read_loop(reader, epoch, cancel, self.events_tx.clone()));

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        self.write_tx = Some(write_tx);
        let writer = AsyncFrameWriter::with_packer(write_half, self.packer.clone());
        self.writer = Some(tokio::spawn(write_loop(
            writer,
            epoch,
            write_rx,
            self.events_tx.clone(),
        )));
    }

    /// The spare decoder, reset, or a fresh one if the last reader has not
    /// handed it back yet.
    fn take_unpacker(&mut self) -> sockprims_frame::Result<Unpacker> {
        match self.spare.take() {
            Some(mut unpacker) => {
                unpacker.reset();
                Ok(unpacker)
            }
            None => Unpacker::new(&self.config.framing, &self.config.frame),
        }
    }

    fn close_transport(&mut self) {
        if let Some(cancel) = self.read_cancel.take() {
            cancel.cancel();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        self.write_tx = None;
        self.stream = None;
    }
}

impl<H> Drop for Driver<H> {
    fn drop(&mut self) {
        if let Some(cancel) = self.read_cancel.take() {
            cancel.cancel();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
    }
}

async fn read_loop(
    mut reader: AsyncFrameReader<OwnedReadHalf>,
    epoch: u64,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<Event>,
) {
    let end = loop {
        let batch = tokio::select! {
            biased;

            () = cancel.cancelled() => break ReadEnd::Cancelled,
            batch = reader.read_batch() => batch,
        };
        match batch {
            Ok(messages) => {
                if events.send(Event::Inbound { epoch, messages }).is_err() {
                    break ReadEnd::Cancelled;
                }
            }
            Err(FrameError::ConnectionClosed | FrameError::EndOfStream) => break ReadEnd::Eof,
            Err(FrameError::Io(err)) => break ReadEnd::Failed(err),
            Err(err) => break ReadEnd::Violation(err),
        }
    };
    trace!(epoch, ?end, "read loop ended");
    let unpacker = reader.into_unpacker();
    let _ = events.send(Event::ReadEnded {
        epoch,
        end,
        unpacker,
    });
}

async fn write_loop(
    mut writer: AsyncFrameWriter<OwnedWriteHalf>,
    epoch: u64,
    mut commands: mpsc::UnboundedReceiver<WriteCmd>,
    events: mpsc::UnboundedSender<Event>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriteCmd::Send(wire) => {
                if let Err(err) = writer.send_raw(&wire).await {
                    let _ = events.send(Event::WriteFailed {
                        epoch,
                        error: into_io(err),
                    });
                    return;
                }
            }
            WriteCmd::Shutdown => {
                let result = writer.shutdown().await.map_err(into_io);
                let _ = events.send(Event::WriteShutdown { epoch, result });
                return;
            }
        }
    }
}

fn into_io(err: FrameError) -> io::Error {
    match err {
        FrameError::Io(err) => err,
        other => io::Error::other(other),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    use super::*;
    use crate::machine::CloseInfo;
    use crate::state::CloseKind;

    #[derive(Debug)]
    enum Seen {
        Connected,
        Message(Bytes),
        Broken,
        ConnectFailed,
        Closed(CloseInfo),
        Timer(TimerId),
    }

    struct Recorder {
        seen: mpsc::UnboundedSender<Seen>,
        timer_on_connect: bool,
    }

    impl LinkHandler for Recorder {
        fn on_connected(&mut self, ctx: &mut LinkContext<'_>) {
            if self.timer_on_connect {
                ctx.set_timer(TimerId::User0, Duration::from_millis(10), false)
                    .unwrap();
            }
            let _ = self.seen.send(Seen::Connected);
        }

        fn on_message(&mut self, _ctx: &mut LinkContext<'_>, msg: Bytes) {
            let _ = self.seen.send(Seen::Message(msg));
        }

        fn on_broken(&mut self, _ctx: &mut LinkContext<'_>, _error: &io::Error) {
            let _ = self.seen.send(Seen::Broken);
        }

        fn on_closed(&mut self, _ctx: &mut LinkContext<'_>, info: CloseInfo) {
            let _ = self.seen.send(Seen::Closed(info));
        }

        fn on_connect_failed(&mut self, _ctx: &mut LinkContext<'_>, _error: &io::Error) {
            let _ = self.seen.send(Seen::ConnectFailed);
        }

        fn on_timer(&mut self, _ctx: &mut LinkContext<'_>, id: TimerId) {
            let _ = self.seen.send(Seen::Timer(id));
        }
    }

    fn spawn_link(
        addr: SocketAddr,
        policy: ReconnectPolicy,
    ) -> (LinkHandle, mpsc::UnboundedReceiver<Seen>) {
        spawn_with(addr, policy, false)
    }

    fn spawn_with(
        addr: SocketAddr,
        policy: ReconnectPolicy,
        timer_on_connect: bool,
    ) -> (LinkHandle, mpsc::UnboundedReceiver<Seen>) {
        let (seen, rx) = mpsc::unbounded_channel();
        let config = LinkConfig {
            endpoint: Endpoint::from(addr),
            policy,
            ..LinkConfig::default()
        };
        let handle = Link::spawn(
            config,
            Recorder {
                seen,
                timer_on_connect,
            },
        )
        .unwrap();
        (handle, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("handler dropped")
    }

    /// Echo every length-prefixed message until the client closes.
    async fn echo_once(listener: &TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let config = FrameConfig::default();
        let (read_half, write_half) = stream.into_split();
        let mut reader =
            AsyncFrameReader::new(read_half, &Framing::LengthPrefixed, &config).unwrap();
        let mut writer =
            AsyncFrameWriter::new(write_half, &Framing::LengthPrefixed, &config).unwrap();
        while let Ok(msg) = reader.read_message().await {
            writer.send(&msg).await.unwrap();
        }
    }

    #[tokio::test]
    async fn connect_send_and_close_gracefully() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { echo_once(&listener).await });

        let (link, mut seen) = spawn_link(addr, ReconnectPolicy::default());
        link.connect().await.unwrap();
        assert!(matches!(next(&mut seen).await, Seen::Connected));
        let state = link.wait_for(|s| *s == LinkState::Connected).await.unwrap();
        assert_eq!(state, LinkState::Connected);

        link.send(&b"hello"[..]).await.unwrap();
        match next(&mut seen).await {
            Seen::Message(msg) => assert_eq!(msg, &b"hello"[..]),
            other => panic!("expected message, got {other:?}"),
        }

        link.graceful_shutdown(false, true).await.unwrap();
        assert_eq!(link.state(), LinkState::Closed);
        match next(&mut seen).await {
            Seen::Closed(info) => assert_eq!(
                info,
                CloseInfo {
                    kind: CloseKind::Graceful,
                    reconnecting: false
                }
            ),
            other => panic!("expected close, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn non_blocking_graceful_returns_before_peer_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release, released) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = released.await;
            drop(stream);
        });

        let (link, mut seen) = spawn_link(addr, ReconnectPolicy::default());
        link.connect().await.unwrap();
        assert!(matches!(next(&mut seen).await, Seen::Connected));

        link.graceful_shutdown(false, false).await.unwrap();
        assert_eq!(link.state(), LinkState::GracefulClosing);
        assert!(matches!(
            link.send(&b"late"[..]).await,
            Err(LinkError::InvalidState {
                op: "send",
                state: LinkState::GracefulClosing
            })
        ));

        release.send(()).unwrap();
        match next(&mut seen).await {
            Seen::Closed(info) => assert_eq!(
                info,
                CloseInfo {
                    kind: CloseKind::Graceful,
                    reconnecting: false
                }
            ),
            other => panic!("expected close, got {other:?}"),
        }
        link.wait_for(|s| *s == LinkState::Closed).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_peer_drops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (first, _) = listener.accept().await.unwrap();
            drop(first);
            let (second, _) = listener.accept().await.unwrap();
            second
        });

        let policy = ReconnectPolicy::fixed(Duration::from_millis(20));
        let (link, mut seen) = spawn_link(addr, policy);
        link.connect().await.unwrap();
        assert!(matches!(next(&mut seen).await, Seen::Connected));
        assert!(matches!(next(&mut seen).await, Seen::Broken));
        match next(&mut seen).await {
            Seen::Closed(info) => {
                assert_eq!(info.kind, CloseKind::Broken);
                assert!(info.reconnecting);
            }
            other => panic!("expected close, got {other:?}"),
        }
        assert!(matches!(next(&mut seen).await, Seen::Connected));

        let _second = server.await.unwrap();
        link.force_shutdown(false).await.unwrap();
        assert!(matches!(next(&mut seen).await, Seen::Closed(_)));
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn refused_connect_without_reconnect_stays_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (link, mut seen) = spawn_link(addr, ReconnectPolicy::never());
        link.connect().await.unwrap();
        assert!(matches!(next(&mut seen).await, Seen::ConnectFailed));
        match next(&mut seen).await {
            Seen::Closed(info) => {
                assert_eq!(info.kind, CloseKind::ReconnectExhausted);
                assert!(!info.reconnecting);
            }
            other => panic!("expected close, got {other:?}"),
        }
        link.wait_for(|s| *s == LinkState::Closed).await.unwrap();

        link.reset().await.unwrap();
        assert_eq!(link.state(), LinkState::Idle);
        assert!(matches!(
            link.send(&b"late"[..]).await,
            Err(LinkError::InvalidState { op: "send", .. })
        ));
    }

    #[tokio::test]
    async fn framing_violation_closes_without_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // One good frame, then a header shorter than itself.
            stream.write_all(&[0, 4, b'o', b'k', 0, 1]).await.unwrap();
            stream
        });

        let policy = ReconnectPolicy::fixed(Duration::from_millis(10));
        let (link, mut seen) = spawn_link(addr, policy);
        link.connect().await.unwrap();
        assert!(matches!(next(&mut seen).await, Seen::Connected));
        match next(&mut seen).await {
            Seen::Message(msg) => assert_eq!(msg, &b"ok"[..]),
            other => panic!("expected message, got {other:?}"),
        }
        assert!(matches!(next(&mut seen).await, Seen::Broken));
        match next(&mut seen).await {
            Seen::Closed(info) => assert_eq!(
                info,
                CloseInfo {
                    kind: CloseKind::Violation,
                    reconnecting: false
                }
            ),
            other => panic!("expected close, got {other:?}"),
        }
        let _stream = server.await.unwrap();
    }

    #[tokio::test]
    async fn user_timer_reaches_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let (link, mut seen) = spawn_with(addr, ReconnectPolicy::default(), true);
        link.connect().await.unwrap();
        assert!(matches!(next(&mut seen).await, Seen::Connected));
        assert!(matches!(next(&mut seen).await, Seen::Timer(TimerId::User0)));

        let _stream = server.await.unwrap();
        link.stop().await.unwrap();
    }

    #[tokio::test]
    async fn operations_respect_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let (link, mut seen) = spawn_link(addr, ReconnectPolicy::default());
        assert!(matches!(
            link.send(&b"early"[..]).await,
            Err(LinkError::InvalidState {
                op: "send",
                state: LinkState::Idle
            })
        ));

        link.connect().await.unwrap();
        assert!(matches!(next(&mut seen).await, Seen::Connected));
        assert!(matches!(
            link.connect().await,
            Err(LinkError::InvalidState { op: "connect", .. })
        ));
        assert!(matches!(
            link.reset().await,
            Err(LinkError::InvalidState { op: "reset", .. })
        ));

        let _stream = server.await.unwrap();
        link.stop().await.unwrap();
        assert!(matches!(link.connect().await, Err(LinkError::Stopped)));
    }

    #[test]
    fn link_ids_are_unique() {
        let a = LinkId::next();
        let b = LinkId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("link-"));
    }
}
