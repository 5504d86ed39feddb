//! Application callbacks.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use sockprims_frame::Packer;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{LinkError, Result};
use crate::link::{LinkId, WriteCmd};
use crate::machine::{CloseInfo, LinkMachine};
use crate::state::LinkState;
use crate::timer::TimerId;

/// Receives the notifications of one link.
///
/// All callbacks of a link run on its driver task, one at a time and in
/// order. They must not block: a callback that waits on I/O stalls the link.
#[allow(unused_variables)]
pub trait LinkHandler: Send + 'static {
    /// The transport is connected and reading has started.
    fn on_connected(&mut self, ctx: &mut LinkContext<'_>) {}

    /// A complete message arrived, in framing order.
    fn on_message(&mut self, ctx: &mut LinkContext<'_>, msg: Bytes);

    /// An established link failed unexpectedly. `on_closed` follows.
    fn on_broken(&mut self, ctx: &mut LinkContext<'_>, error: &io::Error) {}

    /// The link reached `Closed`.
    fn on_closed(&mut self, ctx: &mut LinkContext<'_>, info: CloseInfo) {}

    /// A connect attempt failed. `on_closed` follows.
    fn on_connect_failed(&mut self, ctx: &mut LinkContext<'_>, error: &io::Error) {}

    /// A timer armed with [`LinkContext::set_timer`] fired.
    fn on_timer(&mut self, ctx: &mut LinkContext<'_>, id: TimerId) {}
}

/// The link as seen from inside a callback.
///
/// Only non-blocking operations are available here; waiting for a shutdown
/// to finish is reserved to [`crate::LinkHandle`].
pub struct LinkContext<'a> {
    id: LinkId,
    machine: &'a mut LinkMachine,
    packer: &'a Packer,
    writer: Option<&'a UnboundedSender<WriteCmd>>,
}

impl<'a> LinkContext<'a> {
    pub(crate) fn new(
        id: LinkId,
        machine: &'a mut LinkMachine,
        packer: &'a Packer,
        writer: Option<&'a UnboundedSender<WriteCmd>>,
    ) -> Self {
        Self {
            id,
            machine,
            packer,
            writer,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn state(&self) -> LinkState {
        self.machine.state()
    }

    pub fn is_broken(&self) -> bool {
        self.machine.is_broken()
    }

    /// Frame `msg` and queue it for sending.
    pub fn send(&mut self, msg: &[u8]) -> Result<()> {
        enqueue(self.machine, self.packer, self.writer, msg)
    }

    pub fn force_shutdown(&mut self, reconnect: bool) {
        self.machine.force_shutdown(reconnect);
    }

    /// Start a graceful shutdown without waiting for it to finish.
    pub fn graceful_shutdown(&mut self, reconnect: bool) {
        self.machine.graceful_shutdown(reconnect);
    }

    pub fn open_reconnect(&mut self) {
        self.machine.open_reconnect();
    }

    pub fn close_reconnect(&mut self) {
        self.machine.close_reconnect();
    }

    /// Arm a timer slot; `on_timer` fires with `id`. Re-arming replaces it.
    pub fn set_timer(&mut self, id: TimerId, delay: Duration, periodic: bool) -> Result<()> {
        self.machine.arm_timer(id, delay, periodic)
    }

    pub fn cancel_timer(&mut self, id: TimerId) {
        self.machine.cancel_timer(id);
    }
}

/// Frame `msg` and hand it to the writer of the current connection.
pub(crate) fn enqueue(
    machine: &LinkMachine,
    packer: &Packer,
    writer: Option<&UnboundedSender<WriteCmd>>,
    msg: &[u8],
) -> Result<()> {
    let state = machine.state();
    let writer = match writer {
        Some(writer) if state == LinkState::Connected => writer,
        _ => return Err(LinkError::InvalidState { op: "send", state }),
    };
    let wire = packer.pack_to_bytes(msg)?;
    writer
        .send(WriteCmd::Send(wire))
        .map_err(|_| LinkError::InvalidState { op: "send", state })
}
