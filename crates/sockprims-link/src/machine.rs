//! Sans-io connection lifecycle.
//!
//! [`LinkMachine`] owns every lifecycle decision: which state the link is in,
//! when to reconnect, which completions are stale. It performs no I/O.
//! Callers feed it requests and completions, then drain [`Action`]s with
//! [`LinkMachine::poll_action`] and execute them.
//!
//! Every attempt and every shutdown bumps the epoch. Completions carry the
//! epoch they were started under; a mismatch means the work was overtaken by
//! a shutdown and the completion is dropped.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use sockprims_frame::FrameError;
use tracing::{debug, info, trace, warn};

use crate::error::{LinkError, Result};
use crate::policy::{ReconnectContext, ReconnectDecision, ReconnectPolicy};
use crate::state::{CloseKind, LinkState};
use crate::timer::TimerId;

/// Something the driver must do.
#[derive(Debug)]
pub enum Action {
    /// Open a transport connection; report back with this epoch.
    Connect { epoch: u64 },
    /// Start the read loop on the fresh connection.
    StartReading { epoch: u64 },
    /// Flush queued output, then shut the write half down.
    ShutdownWrite { epoch: u64 },
    /// Drop the transport without flushing and stop reading.
    CloseTransport,
    ArmTimer {
        id: TimerId,
        delay: Duration,
        periodic: bool,
        epoch: u64,
    },
    CancelTimer(TimerId),
    CancelTimers,
    /// Discard buffered framing state.
    ResetFraming,
    Notify(Notification),
}

/// Something the application must hear about.
#[derive(Debug)]
pub enum Notification {
    Connected,
    /// A connect attempt failed.
    ConnectFailed(io::Error),
    /// An established link failed or the peer went away.
    Broken(io::Error),
    Closed(CloseInfo),
    /// A user timer fired.
    Timer(TimerId),
}

/// Details of a transition into `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseInfo {
    pub kind: CloseKind,
    /// A reconnect has been scheduled.
    pub reconnecting: bool,
}

/// How a read loop ended.
#[derive(Debug)]
pub enum ReadEnd {
    /// The peer closed its side.
    Eof,
    Failed(io::Error),
    /// The peer broke the framing protocol.
    Violation(FrameError),
    /// The driver stopped the loop.
    Cancelled,
}

#[derive(Debug)]
pub struct LinkMachine {
    state: LinkState,
    epoch: u64,
    reconnect: bool,
    broken: bool,
    reading: bool,
    /// Reconnects scheduled since the last established connection.
    retries: u32,
    policy: ReconnectPolicy,
    actions: VecDeque<Action>,
}

impl LinkMachine {
    pub fn new(policy: ReconnectPolicy, reconnect: bool) -> Self {
        Self {
            state: LinkState::Idle,
            epoch: 0,
            reconnect,
            broken: false,
            reading: false,
            retries: 0,
            policy,
            actions: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn is_reading(&self) -> bool {
        self.reading
    }

    /// Next action for the driver, in the order they were produced.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    fn push(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    fn is_current(&self, epoch: u64, what: &'static str) -> bool {
        if epoch == self.epoch {
            return true;
        }
        trace!(epoch, current = self.epoch, what, "discarding stale completion");
        false
    }

    /// Start a connect attempt.
    pub fn connect(&mut self) -> Result<()> {
        match self.state {
            LinkState::Connecting => Err(LinkError::OperationInFlight("connect")),
            LinkState::Idle | LinkState::Closed => {
                self.push(Action::CancelTimer(TimerId::Reconnect));
                self.begin_attempt();
                Ok(())
            }
            state => Err(LinkError::InvalidState {
                op: "connect",
                state,
            }),
        }
    }

    fn begin_attempt(&mut self) {
        self.epoch += 1;
        self.state = LinkState::Connecting;
        self.broken = false;
        debug!(epoch = self.epoch, "connecting");
        self.push(Action::Connect { epoch: self.epoch });
    }

    /// Report the end of a connect attempt. Returns `false` if the attempt was
    /// stale; the caller must then discard the connection it got.
    pub fn handle_connect_complete(&mut self, epoch: u64, result: io::Result<()>) -> bool {
        if !self.is_current(epoch, "connect") || self.state != LinkState::Connecting {
            return false;
        }
        match result {
            Ok(()) => {
                info!(epoch, "link established");
                self.state = LinkState::Connected;
                self.retries = 0;
                self.push(Action::StartReading { epoch });
                self.push(Action::Notify(Notification::Connected));
                true
            }
            Err(err) => {
                debug!(epoch, error = %err, "connect failed");
                self.push(Action::Notify(Notification::ConnectFailed(err)));
                self.finish_close(CloseKind::ConnectFailed);
                false
            }
        }
    }

    /// Claim the read slot of the current connection.
    ///
    /// The driver starts one read loop per connection; a second claim while
    /// one is running is rejected.
    pub fn begin_read(&mut self) -> Result<u64> {
        if self.state != LinkState::Connected {
            return Err(LinkError::InvalidState {
                op: "read",
                state: self.state,
            });
        }
        if self.reading {
            return Err(LinkError::OperationInFlight("read"));
        }
        self.reading = true;
        Ok(self.epoch)
    }

    /// Whether messages read under `epoch` should still be delivered.
    pub fn accepts_inbound(&self, epoch: u64) -> bool {
        epoch == self.epoch
            && matches!(
                self.state,
                LinkState::Connected | LinkState::GracefulClosing
            )
    }

    /// Report the end of the read loop.
    pub fn handle_read_end(&mut self, epoch: u64, end: ReadEnd) {
        if !self.is_current(epoch, "read") {
            return;
        }
        self.reading = false;

        match (self.state, end) {
            (_, ReadEnd::Cancelled) => {}
            (LinkState::Connected, ReadEnd::Eof) => {
                self.mark_broken(io::ErrorKind::UnexpectedEof.into());
                self.finish_close(CloseKind::Broken);
            }
            (LinkState::Connected, ReadEnd::Failed(err)) => {
                self.mark_broken(err);
                self.finish_close(CloseKind::Broken);
            }
            (LinkState::Connected | LinkState::GracefulClosing, ReadEnd::Violation(err)) => {
                warn!(epoch, error = %err, "framing violation, closing without reconnect");
                self.reconnect = false;
                self.broken = true;
                self.push(Action::Notify(Notification::Broken(io::Error::new(
                    io::ErrorKind::InvalidData,
                    err,
                ))));
                self.finish_close(CloseKind::Violation);
            }
            (LinkState::GracefulClosing, ReadEnd::Eof) => {
                self.finish_close(CloseKind::Graceful);
            }
            (LinkState::GracefulClosing, ReadEnd::Failed(err)) => {
                debug!(epoch, error = %err, "read failed during graceful shutdown");
                self.finish_close(CloseKind::Broken);
            }
            (state, _) => trace!(epoch, %state, "read end ignored"),
        }
    }

    /// Report that the write half failed.
    pub fn handle_write_failed(&mut self, epoch: u64, err: io::Error) {
        if !self.is_current(epoch, "write") {
            return;
        }
        match self.state {
            LinkState::Connected => {
                self.mark_broken(err);
                self.finish_close(CloseKind::Broken);
            }
            LinkState::GracefulClosing => self.finish_close(CloseKind::Broken),
            state => trace!(epoch, %state, "write failure ignored"),
        }
    }

    /// Report that the write half shut down after a graceful request.
    pub fn handle_write_shutdown(&mut self, epoch: u64, result: io::Result<()>) {
        if !self.is_current(epoch, "write shutdown") {
            return;
        }
        if let Err(err) = result {
            debug!(epoch, error = %err, "write shutdown failed, forcing close");
            if self.state == LinkState::GracefulClosing {
                self.force_close(CloseKind::Requested);
            }
        }
    }

    fn mark_broken(&mut self, err: io::Error) {
        warn!(epoch = self.epoch, error = %err, "link broken");
        self.broken = true;
        self.push(Action::Notify(Notification::Broken(err)));
    }

    /// Tear the link down without flushing.
    ///
    /// From `Closed`/`Idle` this only records the reconnect flag and cancels
    /// the timers. A scheduled reconnect survives when `reconnect` is set.
    pub fn force_shutdown(&mut self, reconnect: bool) {
        self.reconnect = reconnect;
        if self.state.is_at_rest() {
            if reconnect {
                for id in TimerId::ALL {
                    if id != TimerId::Reconnect {
                        self.push(Action::CancelTimer(id));
                    }
                }
            } else {
                self.push(Action::CancelTimers);
            }
            return;
        }
        self.force_close(CloseKind::Requested);
    }

    /// Alias of [`LinkMachine::force_shutdown`].
    pub fn disconnect(&mut self, reconnect: bool) {
        self.force_shutdown(reconnect);
    }

    fn force_close(&mut self, kind: CloseKind) {
        debug!(epoch = self.epoch, state = %self.state, "force closing");
        self.state = LinkState::ForceClosing;
        self.finish_close(kind);
    }

    /// Shut our write side down and wait for the peer to close.
    ///
    /// Degrades to a forced shutdown if the link is broken or not connected.
    pub fn graceful_shutdown(&mut self, reconnect: bool) {
        match self.state {
            LinkState::Connected if !self.broken => {
                self.reconnect = reconnect;
                debug!(epoch = self.epoch, "graceful shutdown");
                self.state = LinkState::GracefulClosing;
                self.push(Action::ShutdownWrite { epoch: self.epoch });
            }
            LinkState::GracefulClosing => self.reconnect = reconnect,
            _ => self.force_shutdown(reconnect),
        }
    }

    fn finish_close(&mut self, kind: CloseKind) {
        self.epoch += 1;
        self.state = LinkState::Closed;
        self.reading = false;
        self.push(Action::CloseTransport);
        self.push(Action::CancelTimers);

        let mut kind = kind;
        let mut reconnecting = false;
        if self.reconnect {
            let ctx = ReconnectContext {
                attempt: self.retries + 1,
                cause: kind,
            };
            match self.policy.decide(&ctx) {
                ReconnectDecision::RetryAfter(delay) => {
                    self.retries += 1;
                    reconnecting = true;
                    debug!(attempt = ctx.attempt, ?delay, "reconnect scheduled");
                    self.push(Action::ArmTimer {
                        id: TimerId::Reconnect,
                        delay,
                        periodic: false,
                        epoch: self.epoch,
                    });
                }
                ReconnectDecision::GiveUp => {
                    info!(attempt = ctx.attempt, "reconnect policy gave up");
                    self.reconnect = false;
                    kind = CloseKind::ReconnectExhausted;
                }
            }
        }

        info!(epoch = self.epoch, %kind, reconnecting, "link closed");
        self.push(Action::Notify(Notification::Closed(CloseInfo {
            kind,
            reconnecting,
        })));
    }

    /// Report a timer expiry.
    pub fn handle_timer(&mut self, id: TimerId, epoch: u64) {
        if !self.is_current(epoch, "timer") {
            return;
        }
        match id {
            TimerId::Reconnect => {
                if self.state == LinkState::Closed && self.reconnect {
                    self.begin_attempt();
                } else {
                    trace!(state = %self.state, "reconnect timer ignored");
                }
            }
            other => self.push(Action::Notify(Notification::Timer(other))),
        }
    }

    /// Arm a user timer. `TimerId::Reconnect` is reserved.
    pub fn arm_timer(&mut self, id: TimerId, delay: Duration, periodic: bool) -> Result<()> {
        if id == TimerId::Reconnect {
            return Err(LinkError::InvalidState {
                op: "arm the reconnect timer",
                state: self.state,
            });
        }
        if self.state.is_closing() {
            return Err(LinkError::ShuttingDown);
        }
        self.push(Action::ArmTimer {
            id,
            delay,
            periodic,
            epoch: self.epoch,
        });
        Ok(())
    }

    pub fn cancel_timer(&mut self, id: TimerId) {
        self.push(Action::CancelTimer(id));
    }

    /// Return to `Idle`, clearing framing state and timers. Re-enables reconnect.
    pub fn reset(&mut self) -> Result<()> {
        if !self.state.is_at_rest() {
            return Err(LinkError::InvalidState {
                op: "reset",
                state: self.state,
            });
        }
        self.epoch += 1;
        self.state = LinkState::Idle;
        self.reconnect = true;
        self.broken = false;
        self.reading = false;
        self.retries = 0;
        self.push(Action::CancelTimers);
        self.push(Action::ResetFraming);
        debug!(epoch = self.epoch, "link reset");
        Ok(())
    }

    pub fn open_reconnect(&mut self) {
        self.reconnect = true;
    }

    pub fn close_reconnect(&mut self) {
        self.reconnect = false;
        self.push(Action::CancelTimer(TimerId::Reconnect));
    }
}
