//! Per-packet decisions.
//!
//! [`Dispatcher::dispatch`] looks at the first packet of the unparsed tail,
//! measures it, applies any policy it is subject to and returns a
//! [`Verdict`]. Side effects only happen once the whole packet has been
//! decoded, so an incomplete packet can be retried later without repeating
//! them.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use mc_gate_proto::codec::{self, ProtoDecode};
use mc_gate_proto::error::ProtoError;
use mc_gate_proto::packets::{
    self, id, BlockPlacement, Chat, DigStatus, Disconnect, Handshake, Login, Packet,
    PlayerDigging, PlayerPosition, PlayerPositionLook, WindowClick,
};
use mc_gate_proto::packets::chat::MAX_CHAT_LENGTH;
use mc_gate_proto::types::{BlockPos, Direction};

use crate::connection::{Connection, Position};
use crate::state::ProxyState;

/// What to do with a packet that has been measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Relay,
    Redact,
    /// Relay these bytes instead.
    Replace(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Byte length of the packet, id included.
    pub len: usize,
    pub verdict: Verdict,
}

pub struct Dispatcher {
    direction: Direction,
    connection: Arc<Connection>,
    state: Arc<ProxyState>,
    /// Packets to write after the next flush, in order.
    injected: Vec<Bytes>,
    movement_packets: u64,
}

impl Dispatcher {
    pub fn new(direction: Direction, connection: Arc<Connection>, state: Arc<ProxyState>) -> Self {
        Self {
            direction,
            connection,
            state,
            injected: Vec::new(),
            movement_packets: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn state(&self) -> &Arc<ProxyState> {
        &self.state
    }

    pub fn inject(&mut self, packet: Bytes) {
        self.injected.push(packet);
    }

    pub fn take_injected(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.injected)
    }

    /// Decide on the packet at the start of `data`.
    ///
    /// `BufferTooShort` means the packet is not complete yet; any other error
    /// means the stream can no longer be framed.
    pub fn dispatch(&mut self, data: &[u8]) -> Result<Dispatched, ProtoError> {
        let mut buf = data;
        let packet_id = codec::read_u8(&mut buf)?;
        let verdict = match (self.direction, packet_id) {
            (Direction::Serverbound, id::CHAT) => {
                let chat = Chat::proto_decode(&mut buf)?;
                self.on_player_chat(chat)
            }
            (Direction::Clientbound, id::CHAT) => {
                let chat = Chat::proto_decode(&mut buf)?;
                self.on_server_chat(chat)
            }
            (Direction::Serverbound, id::HANDSHAKE) => {
                let handshake = Handshake::proto_decode(&mut buf)?;
                self.on_handshake(handshake)
            }
            (Direction::Serverbound, id::LOGIN) => {
                let login = Login::proto_decode(&mut buf)?;
                self.on_login(login)
            }
            (Direction::Serverbound, id::PLAYER_POSITION) => {
                let pos = PlayerPosition::proto_decode(&mut buf)?;
                self.on_client_movement(pos.x, pos.y, pos.z, pos.stance);
                Verdict::Relay
            }
            (Direction::Serverbound, id::PLAYER_POSITION_LOOK) => {
                let pos = PlayerPositionLook::decode(&mut buf, Direction::Serverbound)?;
                self.on_client_movement(pos.x, pos.y, pos.z, pos.stance);
                Verdict::Relay
            }
            (Direction::Clientbound, id::PLAYER_POSITION_LOOK) => {
                let pos = PlayerPositionLook::decode(&mut buf, Direction::Clientbound)?;
                self.connection.set_position(Position {
                    x: pos.x,
                    y: pos.y,
                    z: pos.z,
                    stance: pos.stance,
                });
                Verdict::Relay
            }
            (Direction::Serverbound, id::PLAYER_DIGGING) => {
                let dig = PlayerDigging::proto_decode(&mut buf)?;
                self.on_dig(dig)
            }
            (Direction::Serverbound, id::BLOCK_PLACEMENT) => {
                let place = BlockPlacement::proto_decode(&mut buf)?;
                self.on_place(place)
            }
            (Direction::Serverbound, id::WINDOW_CLICK) => {
                let click = WindowClick::proto_decode(&mut buf)?;
                self.on_window_click(click)
            }
            (_, id::DISCONNECT) => {
                let disconnect = Disconnect::proto_decode(&mut buf)?;
                self.on_disconnect(disconnect);
                Verdict::Relay
            }
            _ => {
                let layout =
                    packets::layout(packet_id).ok_or(ProtoError::UnknownPacketId(packet_id))?;
                layout.skip(&mut buf)?;
                Verdict::Relay
            }
        };
        let len = data.len() - buf.len();
        trace!(
            "{} {}: packet 0x{packet_id:02X} ({len} bytes) -> {verdict:?}",
            self.direction,
            self.connection
        );
        Ok(Dispatched { len, verdict })
    }

    fn is_admin(&self) -> bool {
        self.state.is_admin(&self.connection)
    }

    /// Whether the player may touch a block that might be locked.
    fn may_access(&self, pos: BlockPos) -> bool {
        let locks = &self.state.policy.locks;
        if !locks.has_lock(pos) || self.is_admin() {
            return true;
        }
        self.connection
            .name()
            .is_some_and(|name| locks.owns_lock(&name, pos))
    }

    fn on_player_chat(&mut self, chat: Chat) -> Verdict {
        let state = Arc::clone(&self.state);
        if chat.message.starts_with(state.config.chat.command_prefix.as_str())
            && state.commands.try_handle(&state, &self.connection, &chat.message)
        {
            return Verdict::Redact;
        }
        let muted = self
            .connection
            .name()
            .is_some_and(|name| state.policy.mutes.is_muted(&name));
        if muted {
            debug!("Dropped chat from muted {}: {}", self.connection, chat.message);
            self.connection.send_message("You are muted.");
            return Verdict::Redact;
        }
        info!("<{}> {}", self.connection, chat.message);
        Verdict::Relay
    }

    fn on_server_chat(&mut self, chat: Chat) -> Verdict {
        debug!("{} sees: {}", self.connection, chat.message);
        let Some(format) = &self.state.config.chat.format else {
            return Verdict::Relay;
        };
        let Some((name, text)) = chat.player_line() else {
            return Verdict::Relay;
        };
        let rank = self.state.policy.ranks.rank_of(name);
        let prefix = format
            .replace("{name}", name)
            .replace("{rank}", &rank.to_string());
        let line = format!("{prefix}{text}");
        if line.chars().count() > MAX_CHAT_LENGTH {
            return Verdict::Relay;
        }
        Verdict::Replace(Chat::new(line).to_bytes())
    }

    fn on_handshake(&mut self, handshake: Handshake) -> Verdict {
        match self.state.check_name(&handshake.username) {
            Ok(()) => Verdict::Relay,
            Err(reason) => self.refuse(&handshake.username, &reason),
        }
    }

    fn on_login(&mut self, login: Login) -> Verdict {
        let name = login.username;
        if let Err(reason) =
            self.state
                .check_login(&self.connection, &name, login.protocol_or_entity)
        {
            return self.refuse(&name, &reason);
        }
        let rank = self.state.policy.ranks.rank_of(&name);
        self.connection.set_identity(&name, rank);
        if self.connection.is_robot() {
            debug!("{name} joined from {} (robot)", self.connection.addr());
        } else {
            info!(
                "{name} joined from {} with rank {rank}",
                self.connection.addr()
            );
        }
        Verdict::Relay
    }

    fn refuse(&mut self, name: &str, reason: &str) -> Verdict {
        warn!(
            "Refused {name} from {}: {reason}",
            self.connection.addr()
        );
        self.connection.kick(reason);
        Verdict::Redact
    }

    fn on_client_movement(&mut self, x: f64, y: f64, z: f64, stance: f64) {
        let rate = u64::from(self.state.config.tunnel.position_sample_rate.max(1));
        if self.movement_packets % rate == 0 {
            self.connection.set_position(Position { x, y, z, stance });
        }
        self.movement_packets += 1;
    }

    fn on_dig(&mut self, dig: PlayerDigging) -> Verdict {
        let pos = dig.position();
        if !self.may_access(pos) {
            warn!("{} tried to break locked block at {pos}", self.connection);
            self.connection.send_message("That block is locked.");
            return Verdict::Redact;
        }
        if self.connection.god_mode() && dig.status == DigStatus::Started {
            self.inject(dig.with_status(DigStatus::Started).to_bytes());
            self.inject(dig.with_status(DigStatus::Finished).to_bytes());
            return Verdict::Redact;
        }
        Verdict::Relay
    }

    fn on_place(&mut self, place: BlockPlacement) -> Verdict {
        if place.is_use_in_air() {
            return Verdict::Relay;
        }
        let pos = place.position();
        if self.connection.take_lock_attempt() {
            self.create_lock(pos);
            return Verdict::Redact;
        }
        if !self.may_access(pos) {
            warn!("{} tried to open locked block at {pos}", self.connection);
            self.connection.send_message("That chest is locked.");
            return Verdict::Redact;
        }
        if let Some(block) = place.block_id() {
            let firewall = &self.state.policy.firewall;
            let rank = self.connection.rank();
            if firewall.is_watched(block) && !firewall.is_allowed(rank, block) {
                warn!(
                    "{} (rank {rank}) tried to place block {block} at {pos}",
                    self.connection
                );
                self.state.broadcast(&format!(
                    "{} tried to place forbidden block {block}",
                    self.connection
                ));
                return Verdict::Redact;
            }
        }
        Verdict::Relay
    }

    fn create_lock(&mut self, pos: BlockPos) {
        let Some(name) = self.connection.name() else {
            return;
        };
        if self.state.policy.locks.create_lock(&name, pos, false) {
            info!("{name} locked {pos}");
            self.connection.send_message(format!("Locked the block at {pos}."));
        } else {
            self.connection
                .send_message("That block is already locked.");
        }
    }

    fn on_window_click(&mut self, click: WindowClick) -> Verdict {
        if self.connection.is_guest() {
            return Verdict::Redact;
        }
        let Some(item) = click.item else {
            return Verdict::Relay;
        };
        let items = &self.state.policy.items;
        let rank = self.connection.rank();
        if items.is_watched(item.id) && !items.is_allowed(rank, item.id, i32::from(item.count)) {
            self.state.escalate(&self.connection, item);
            return Verdict::Redact;
        }
        Verdict::Relay
    }

    fn on_disconnect(&mut self, disconnect: Disconnect) {
        match self.direction {
            Direction::Serverbound => {
                debug!("{} quit: {}", self.connection, disconnect.reason)
            }
            Direction::Clientbound => {
                info!("{} was disconnected: {}", self.connection, disconnect.reason)
            }
        }
        if disconnect.is_timeout() {
            self.state.robots.mark(self.connection.addr().ip());
        }
    }
}
