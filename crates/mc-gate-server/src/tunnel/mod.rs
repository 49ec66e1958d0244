//! One direction of a proxied connection.
//!
//! A tunnel reads into its [`ByteWindow`], lets the [`Dispatcher`] walk whole
//! packets, then writes the parsed prefix followed by any injected packets.
//! The task sleeps until the socket is readable, the outbox has something,
//! the connection closes or the idle deadline passes.

pub mod dispatch;
pub mod window;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use mc_gate_proto::error::ProtoError;
use mc_gate_proto::packets::{Chat, Disconnect, Packet};
use mc_gate_proto::types::Direction;

use crate::config::TunnelSection;
use crate::connection::{Connection, Outgoing};
use crate::diagnostics::DesyncReport;
use crate::error::TunnelError;
use crate::state::ProxyState;
use dispatch::{Dispatcher, Verdict};
use window::ByteWindow;

/// Relayed chunks kept for desync reports.
pub const HISTORY_LEN: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct TunnelSettings {
    pub capacity: usize,
    /// Bytes parsed before a flush is forced.
    pub flush_threshold: usize,
    pub idle_timeout: Duration,
}

impl TunnelSettings {
    pub fn for_direction(config: &TunnelSection, direction: Direction) -> Self {
        let (capacity, flush_threshold) = match direction {
            Direction::Serverbound => {
                (config.serverbound_capacity, config.serverbound_flush_threshold)
            }
            Direction::Clientbound => {
                (config.clientbound_capacity, config.clientbound_flush_threshold)
            }
        };
        Self {
            capacity,
            flush_threshold: flush_threshold.max(1),
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// Why a tunnel stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelExit {
    /// The source socket reached end of stream.
    PeerClosed,
    /// The connection was closed from elsewhere.
    ConnectionClosed,
    IdleTimeout,
    /// The destination stopped accepting bytes for a whole idle period.
    WriteStalled,
    Kicked,
}

enum Wake {
    Data(usize),
    Outgoing(Outgoing),
    Eof,
    Closed,
    Idle,
}

#[derive(Debug, PartialEq, Eq)]
enum Progress {
    /// Everything complete has been parsed; more bytes are needed.
    Stalled,
    /// The flush threshold was hit with complete packets still buffered.
    Throttled,
}

pub struct Tunnel<R, W> {
    reader: R,
    writer: W,
    window: ByteWindow,
    dispatcher: Dispatcher,
    outbox: Option<mpsc::UnboundedReceiver<Outgoing>>,
    pending_kick: Option<String>,
    history: VecDeque<Bytes>,
    flush_threshold: usize,
    idle_timeout: Duration,
    last_activity: Instant,
}

impl<R, W> Tunnel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Only the client-facing (clientbound) tunnel gets the outbox.
    pub fn new(
        direction: Direction,
        reader: R,
        writer: W,
        connection: Arc<Connection>,
        state: Arc<ProxyState>,
        outbox: Option<mpsc::UnboundedReceiver<Outgoing>>,
        settings: TunnelSettings,
    ) -> Self {
        Self {
            reader,
            writer,
            window: ByteWindow::new(settings.capacity),
            dispatcher: Dispatcher::new(direction, connection, state),
            outbox,
            pending_kick: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
            flush_threshold: settings.flush_threshold,
            idle_timeout: settings.idle_timeout,
            last_activity: Instant::now(),
        }
    }

    /// Relay until the connection ends, then close it. A kicked client→server
    /// tunnel leaves closing to its partner, which still has to deliver the
    /// kick packet.
    pub async fn run(mut self) -> Result<TunnelExit, TunnelError> {
        let result = self.pump().await;
        let direction = self.dispatcher.direction();
        let connection = Arc::clone(self.dispatcher.connection());
        match &result {
            Ok(TunnelExit::Kicked) if direction == Direction::Serverbound => {
                debug!("{direction} {connection}: stopped after kick");
            }
            Ok(TunnelExit::IdleTimeout) => {
                info!("Closing idle connection {connection}");
                connection.close();
            }
            Ok(TunnelExit::WriteStalled) => {
                info!("Closing {connection}: {direction} writes stalled");
                connection.close();
            }
            Ok(exit) => {
                debug!("{direction} {connection}: {exit:?}");
                connection.close();
            }
            Err(e) if e.is_desync() => {
                warn!("{direction} {connection}: {e}");
                self.report(e);
                connection.close();
            }
            Err(e) => {
                debug!("{direction} {connection}: {e}");
                connection.close();
            }
        }
        result
    }

    async fn pump(&mut self) -> Result<TunnelExit, TunnelError> {
        let mut closed = self.dispatcher.connection().closed_signal();
        let mut progress = Progress::Stalled;
        loop {
            if progress == Progress::Stalled {
                if self.window.is_full() {
                    return Err(TunnelError::PacketTooLarge {
                        capacity: self.window.capacity(),
                    });
                }
                match self.wait(&mut closed).await? {
                    Wake::Data(n) => self.window.commit(n),
                    Wake::Outgoing(outgoing) => self.queue_outgoing(outgoing),
                    Wake::Eof => return Ok(TunnelExit::PeerClosed),
                    Wake::Closed => return Ok(TunnelExit::ConnectionClosed),
                    Wake::Idle => return Ok(TunnelExit::IdleTimeout),
                }
            }

            // Packets parsed before a desync already had their effects, so
            // their bytes are still delivered before the error is reported.
            let parsed = self.parse();
            let kick = if parsed.is_ok() {
                self.drain_outbox();
                self.pending_kick.take()
            } else {
                None
            };
            let delivered = self.deliver(&mut closed, kick.as_deref()).await;
            progress = parsed?;
            if let Some(exit) = delivered? {
                return Ok(exit);
            }
            if kick.is_some() {
                return Ok(TunnelExit::Kicked);
            }
            if self.dispatcher.direction() == Direction::Serverbound
                && self.dispatcher.connection().is_kicked()
            {
                return Ok(TunnelExit::Kicked);
            }
        }
    }

    async fn wait(&mut self, closed: &mut watch::Receiver<bool>) -> Result<Wake, TunnelError> {
        if *closed.borrow() {
            return Ok(Wake::Closed);
        }
        let deadline = self.last_activity + self.idle_timeout;
        let wake = tokio::select! {
            read = self.reader.read(self.window.spare_mut()) => match read? {
                0 => Wake::Eof,
                n => Wake::Data(n),
            },
            Some(outgoing) = next_outgoing(&mut self.outbox) => Wake::Outgoing(outgoing),
            _ = closed.changed() => Wake::Closed,
            _ = time::sleep_until(deadline) => Wake::Idle,
        };
        if let Wake::Data(_) = wake {
            self.last_activity = Instant::now();
        }
        Ok(wake)
    }

    /// Walk complete packets until the tail is incomplete or the flush
    /// threshold is reached.
    fn parse(&mut self) -> Result<Progress, TunnelError> {
        let serverbound = self.dispatcher.direction() == Direction::Serverbound;
        let mut parsed_now = 0;
        while self.window.has_unparsed() {
            if parsed_now >= self.flush_threshold {
                return Ok(Progress::Throttled);
            }
            if serverbound && self.dispatcher.connection().is_kicked() {
                break;
            }
            let start = self.window.parsed();
            let dispatched = match self.dispatcher.dispatch(self.window.unparsed()) {
                Ok(dispatched) => dispatched,
                Err(e) if e.is_incomplete() => break,
                Err(ProtoError::UnknownPacketId(packet_id)) => {
                    return Err(TunnelError::UnknownPacket {
                        packet_id,
                        offset: start,
                    })
                }
                Err(source) => {
                    return Err(TunnelError::Malformed {
                        offset: start,
                        source,
                    })
                }
            };
            self.window.advance(dispatched.len);
            parsed_now += dispatched.len;
            match dispatched.verdict {
                Verdict::Relay => {}
                Verdict::Redact => self.window.redact(start),
                Verdict::Replace(packet) => {
                    if !self.window.replace(start, &packet) {
                        debug!("Replacement does not fit, relaying the original");
                    }
                }
            }
        }
        Ok(Progress::Stalled)
    }

    fn queue_outgoing(&mut self, outgoing: Outgoing) {
        if self.pending_kick.is_some() {
            return;
        }
        match outgoing {
            Outgoing::Message(text) => {
                for chat in Chat::wrap(&text) {
                    self.dispatcher.inject(chat.to_bytes());
                }
            }
            Outgoing::Kick(reason) => self.pending_kick = Some(reason),
        }
    }

    fn drain_outbox(&mut self) {
        while let Some(outgoing) = self.outbox.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.queue_outgoing(outgoing);
        }
    }

    /// Flush and write the kick, if any. Gives up when the connection closes
    /// or the destination accepts nothing for an idle period.
    async fn deliver(
        &mut self,
        closed: &mut watch::Receiver<bool>,
        kick: Option<&str>,
    ) -> Result<Option<TunnelExit>, TunnelError> {
        let deadline = self.idle_timeout;
        tokio::select! {
            written = self.write_out(kick) => written.map(|()| None),
            _ = closed.changed() => Ok(Some(TunnelExit::ConnectionClosed)),
            _ = time::sleep(deadline) => Ok(Some(TunnelExit::WriteStalled)),
        }
    }

    async fn write_out(&mut self, kick: Option<&str>) -> Result<(), TunnelError> {
        self.flush().await?;
        if let Some(reason) = kick {
            self.write_kick(reason).await?;
        }
        Ok(())
    }

    /// Write the parsed prefix, then injected packets.
    async fn flush(&mut self) -> Result<(), TunnelError> {
        let injected = self.dispatcher.take_injected();
        if self.window.parsed() == 0 && injected.is_empty() {
            return Ok(());
        }
        if self.window.parsed() > 0 {
            let chunk = Bytes::copy_from_slice(self.window.flushable());
            self.writer.write_all(&chunk).await?;
            self.remember(chunk);
            self.window.compact();
        }
        for packet in injected {
            self.writer.write_all(&packet).await?;
            self.remember(packet);
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn write_kick(&mut self, reason: &str) -> Result<(), TunnelError> {
        let packet = Disconnect::new(reason).to_bytes();
        self.writer.write_all(&packet).await?;
        self.writer.flush().await?;
        let _ = self.writer.shutdown().await;
        Ok(())
    }

    fn remember(&mut self, chunk: Bytes) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(chunk);
    }

    fn report(&self, error: &TunnelError) {
        let connection = self.dispatcher.connection();
        let report = DesyncReport {
            context: format!(
                "{} {connection} ({}): {error}",
                self.dispatcher.direction(),
                connection.addr()
            ),
            slot: connection.id().slot,
            unparsed: Bytes::copy_from_slice(self.window.unparsed()),
            history: self.history.iter().cloned().collect(),
        };
        self.dispatcher.state().diagnostics.dump(report);
    }
}

/// Next outbox entry, or a future that never resolves if there is no outbox.
fn next_outgoing(
    outbox: &mut Option<mpsc::UnboundedReceiver<Outgoing>>,
) -> impl Future<Output = Option<Outgoing>> + '_ {
    async move {
        match outbox {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }
}
