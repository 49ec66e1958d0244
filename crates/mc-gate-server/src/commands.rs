//! Glue between chat/console input and the command registry.
//!
//! The registry decides what a command means; this module turns its result
//! into effects on connections and policy tables.

use mc_gate_command::{
    split_command, CommandAction, CommandContext, CommandRegistry, CommandResult, CONSOLE_RANK,
};
use tracing::info;

use crate::connection::Connection;
use crate::state::ProxyState;

pub trait CommandParser: Send + Sync {
    /// Run `text` if it is a known command. Returns whether it was consumed;
    /// unconsumed chat is relayed to the wrapped server.
    fn try_handle(&self, state: &ProxyState, sender: &Connection, text: &str) -> bool;

    /// Run a console line with unlimited rank. Replies go to the log.
    fn run_console(&self, state: &ProxyState, line: &str);
}

enum Sender<'a> {
    Player(&'a Connection),
    Console,
}

impl Sender<'_> {
    fn reply(&self, message: &str) {
        match self {
            Self::Player(connection) => connection.send_message(message),
            Self::Console => info!("{message}"),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Player(connection) => connection.to_string(),
            Self::Console => "Console".to_string(),
        }
    }
}

pub struct ChatCommands {
    prefix: String,
    registry: CommandRegistry,
}

impl ChatCommands {
    pub fn new(prefix: &str, admin_rank: i32) -> Self {
        Self {
            prefix: prefix.to_string(),
            registry: CommandRegistry::new(admin_rank),
        }
    }

    fn context(&self, state: &ProxyState, sender: &Sender<'_>, args: Vec<String>) -> CommandContext {
        let (rank, position) = match sender {
            Sender::Player(connection) => (
                connection.rank(),
                connection.position().map(|p| (p.x, p.y, p.z)),
            ),
            Sender::Console => (CONSOLE_RANK, None),
        };
        CommandContext {
            sender_name: sender.name(),
            sender_rank: rank,
            args,
            online_players: state.pool.online_names(),
            position,
        }
    }

    fn apply(&self, state: &ProxyState, sender: &Sender<'_>, result: CommandResult) {
        for message in &result.messages {
            sender.reply(message);
        }
        if let Some(message) = &result.broadcast {
            state.broadcast(message);
        }
        for action in result.actions {
            self.apply_action(state, sender, action);
        }
        if result.should_stop {
            state.request_shutdown();
        }
    }

    fn apply_action(&self, state: &ProxyState, sender: &Sender<'_>, action: CommandAction) {
        match action {
            CommandAction::ArmChestLock => match sender {
                Sender::Player(connection) => connection.arm_lock(),
                Sender::Console => sender.reply("Only players can lock chests."),
            },
            CommandAction::ToggleGodMode => match sender {
                Sender::Player(connection) => {
                    let enabled = connection.toggle_god_mode();
                    info!("{connection} set instant breaking to {enabled}");
                    sender.reply(if enabled {
                        "Instant breaking enabled."
                    } else {
                        "Instant breaking disabled."
                    });
                }
                Sender::Console => sender.reply("Only players can break blocks."),
            },
            CommandAction::LocalChat(message) => {
                let Sender::Player(connection) = sender else {
                    sender.reply("Only players have a location.");
                    return;
                };
                let Some(center) = connection.position() else {
                    sender.reply("Your position is not known yet.");
                    return;
                };
                let line = format!("[local] <{connection}> {message}");
                info!("{line}");
                for listener in state.pool.nearby(&center, state.config.chat.local_radius) {
                    listener.send_message(line.as_str());
                }
            }
            CommandAction::Whisper { target, message } => {
                match state.pool.find_by_name(&target) {
                    Some(recipient) => {
                        recipient.send_message(format!("{} whispers: {message}", sender.name()));
                        sender.reply(&format!("You whisper to {recipient}: {message}"));
                    }
                    None => sender.reply(&format!("{target} is not online.")),
                }
            }
            CommandAction::Kick { target, reason } => match state.pool.find_by_name(&target) {
                Some(victim) => {
                    victim.kick(&reason);
                    sender.reply(&format!("Kicked {victim}: {reason}"));
                }
                None => sender.reply(&format!("{target} is not online.")),
            },
            CommandAction::Mute(target) => {
                if state.policy.mutes.mute(&target) {
                    info!("{} muted {target}", sender.name());
                    if let Some(victim) = state.pool.find_by_name(&target) {
                        victim.send_message("You have been muted.");
                    }
                    sender.reply(&format!("Muted {target}."));
                } else {
                    sender.reply(&format!("{target} is already muted."));
                }
            }
            CommandAction::Unmute(target) => {
                if state.policy.mutes.unmute(&target) {
                    info!("{} unmuted {target}", sender.name());
                    if let Some(victim) = state.pool.find_by_name(&target) {
                        victim.send_message("You can chat again.");
                    }
                    sender.reply(&format!("Unmuted {target}."));
                } else {
                    sender.reply(&format!("{target} is not muted."));
                }
            }
        }
    }
}

impl CommandParser for ChatCommands {
    fn try_handle(&self, state: &ProxyState, sender: &Connection, text: &str) -> bool {
        let Some(line) = text.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        let (name, args) = split_command(line);
        if !self.registry.contains(&name) {
            return false;
        }
        info!("{sender} issued command: {text}");
        let sender = Sender::Player(sender);
        let ctx = self.context(state, &sender, args);
        let result = self.registry.execute(&name, &ctx);
        self.apply(state, &sender, result);
        true
    }

    fn run_console(&self, state: &ProxyState, line: &str) {
        let line = line.strip_prefix(self.prefix.as_str()).unwrap_or(line);
        let (name, args) = split_command(line);
        if name.is_empty() {
            return;
        }
        let ctx = self.context(state, &Sender::Console, args);
        let result = self.registry.execute(&name, &ctx);
        self.apply(state, &Sender::Console, result);
    }
}
