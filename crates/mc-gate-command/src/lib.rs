//! Chat command parsing, registry, and built-in commands.
//!
//! Handlers are pure: they read a [`CommandContext`] and describe what should
//! happen in a [`CommandResult`]. The proxy applies the returned
//! [`CommandAction`]s to live connections.

use std::collections::BTreeMap;

/// Rank of a player the rank resolver does not know.
pub const GUEST_RANK: i32 = -1;

/// Rank of the local console; passes every permission check.
pub const CONSOLE_RANK: i32 = i32::MAX;

/// Context passed to a command handler.
pub struct CommandContext {
    /// Name of the player (or console) executing the command.
    pub sender_name: String,
    pub sender_rank: i32,
    /// Arguments after the command name.
    pub args: Vec<String>,
    /// Names of visible online players, injected by the proxy.
    pub online_players: Vec<String>,
    /// Last known position of the sender, if it has one.
    pub position: Option<(f64, f64, f64)>,
}

/// Side effects a command asks the proxy to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// The sender's next right click locks the clicked chest.
    ArmChestLock,
    /// Flip the sender's instant-break mode.
    ToggleGodMode,
    /// Deliver to players near the sender.
    LocalChat(String),
    Whisper { target: String, message: String },
    Kick { target: String, reason: String },
    Mute(String),
    Unmute(String),
}

/// Result returned by a command handler.
pub struct CommandResult {
    /// Whether the command executed successfully.
    pub success: bool,
    /// Messages to send back to the command sender.
    pub messages: Vec<String>,
    /// Optional message to broadcast to all players.
    pub broadcast: Option<String>,
    pub actions: Vec<CommandAction>,
    /// If true, the proxy should shut down.
    pub should_stop: bool,
}

impl CommandResult {
    /// Create a successful result with a single message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            messages: vec![message.into()],
            broadcast: None,
            actions: Vec::new(),
            should_stop: false,
        }
    }

    /// Create a failed result with a single message.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            messages: vec![message.into()],
            broadcast: None,
            actions: Vec::new(),
            should_stop: false,
        }
    }

    /// Successful result that only carries an action.
    pub fn action(action: CommandAction) -> Self {
        Self {
            success: true,
            messages: Vec::new(),
            broadcast: None,
            actions: vec![action],
            should_stop: false,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}

/// Function pointer type for command handlers.
pub type CommandFn = fn(&CommandContext) -> CommandResult;

/// A registered command.
pub struct CommandEntry {
    pub name: String,
    pub description: String,
    /// Lowest rank allowed to run the command.
    pub min_rank: i32,
    pub handler: CommandFn,
}

/// Split a command line (prefix already stripped) into name and arguments.
pub fn split_command(line: &str) -> (String, Vec<String>) {
    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or("").to_ascii_lowercase();
    (name, parts.map(String::from).collect())
}

/// Registry of available chat commands.
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandEntry>,
}

impl CommandRegistry {
    /// Create a registry with the built-in commands. Administrative commands
    /// require `admin_rank`.
    pub fn new(admin_rank: i32) -> Self {
        let mut registry = Self {
            commands: BTreeMap::new(),
        };
        registry.register("help", "List available commands", GUEST_RANK, cmd_help);
        registry.register("list", "Show online players", GUEST_RANK, cmd_list);
        registry.register("lock", "Lock the next chest you click", 0, cmd_lock);
        registry.register("where", "Show your position", 0, cmd_where);
        registry.register("local", "Talk to nearby players", 0, cmd_local);
        registry.register("tell", "Message one player", 0, cmd_tell);
        registry.register("destroy", "Toggle instant block breaking", admin_rank, cmd_destroy);
        registry.register("kick", "Disconnect a player", admin_rank, cmd_kick);
        registry.register("mute", "Stop a player from chatting", admin_rank, cmd_mute);
        registry.register("unmute", "Let a player chat again", admin_rank, cmd_unmute);
        registry.register("stop", "Stop the proxy", CONSOLE_RANK, cmd_stop);
        registry
    }

    /// Register a command.
    pub fn register(&mut self, name: &str, description: &str, min_rank: i32, handler: CommandFn) {
        self.commands.insert(
            name.to_string(),
            CommandEntry {
                name: name.to_string(),
                description: description.to_string(),
                min_rank,
                handler,
            },
        );
    }

    /// Whether a command with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Execute a command by name, enforcing its rank requirement.
    pub fn execute(&self, name: &str, ctx: &CommandContext) -> CommandResult {
        let Some(entry) = self.commands.get(name) else {
            return CommandResult::err(format!(
                "Unknown command: {name}. Type help for a list of commands."
            ));
        };
        if ctx.sender_rank < entry.min_rank {
            return CommandResult::err("You do not have permission to use this command.");
        }
        if name == "help" {
            return self.help(ctx.sender_rank);
        }
        (entry.handler)(ctx)
    }

    fn help(&self, rank: i32) -> CommandResult {
        let mut lines = vec!["Available commands:".to_string()];
        for entry in self.commands.values().filter(|e| rank >= e.min_rank) {
            lines.push(format!("  {} - {}", entry.name, entry.description));
        }
        CommandResult {
            success: true,
            messages: lines,
            broadcast: None,
            actions: Vec::new(),
            should_stop: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in commands
// ---------------------------------------------------------------------------

fn cmd_help(_ctx: &CommandContext) -> CommandResult {
    // Rendered by the registry, which knows the command table.
    CommandResult::ok("Available commands:")
}

fn cmd_list(ctx: &CommandContext) -> CommandResult {
    let count = ctx.online_players.len();
    let names = if ctx.online_players.is_empty() {
        String::new()
    } else {
        format!(": {}", ctx.online_players.join(", "))
    };
    CommandResult::ok(format!(
        "There {verb} {count} player{s} online{names}",
        verb = if count == 1 { "is" } else { "are" },
        s = if count == 1 { "" } else { "s" },
    ))
}

fn cmd_lock(_ctx: &CommandContext) -> CommandResult {
    CommandResult::action(CommandAction::ArmChestLock)
        .with_message("Right-click the chest you want to lock.")
}

fn cmd_where(ctx: &CommandContext) -> CommandResult {
    match ctx.position {
        Some((x, y, z)) => CommandResult::ok(format!("You are at {x:.1}, {y:.1}, {z:.1}")),
        None => CommandResult::err("Your position is not known yet."),
    }
}

fn cmd_local(ctx: &CommandContext) -> CommandResult {
    if ctx.args.is_empty() {
        return CommandResult::err("Usage: local <message>");
    }
    CommandResult::action(CommandAction::LocalChat(ctx.args.join(" ")))
}

fn cmd_tell(ctx: &CommandContext) -> CommandResult {
    if ctx.args.len() < 2 {
        return CommandResult::err("Usage: tell <player> <message>");
    }
    CommandResult::action(CommandAction::Whisper {
        target: ctx.args[0].clone(),
        message: ctx.args[1..].join(" "),
    })
}

fn cmd_destroy(_ctx: &CommandContext) -> CommandResult {
    CommandResult::action(CommandAction::ToggleGodMode)
}

fn cmd_kick(ctx: &CommandContext) -> CommandResult {
    let Some(target) = ctx.args.first() else {
        return CommandResult::err("Usage: kick <player> [reason]");
    };
    let reason = if ctx.args.len() > 1 {
        ctx.args[1..].join(" ")
    } else {
        "Kicked by an operator".to_string()
    };
    CommandResult::action(CommandAction::Kick {
        target: target.clone(),
        reason,
    })
}

fn cmd_mute(ctx: &CommandContext) -> CommandResult {
    match ctx.args.first() {
        Some(target) => CommandResult::action(CommandAction::Mute(target.clone())),
        None => CommandResult::err("Usage: mute <player>"),
    }
}

fn cmd_unmute(ctx: &CommandContext) -> CommandResult {
    match ctx.args.first() {
        Some(target) => CommandResult::action(CommandAction::Unmute(target.clone())),
        None => CommandResult::err("Usage: unmute <player>"),
    }
}

fn cmd_stop(_ctx: &CommandContext) -> CommandResult {
    CommandResult {
        success: true,
        messages: vec!["Stopping the proxy...".to_string()],
        broadcast: None,
        actions: Vec::new(),
        should_stop: true,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
