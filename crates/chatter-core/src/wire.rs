//! Wire protocol: `cmd$args` requests and channel-tagged replies.
//!
//! One datagram carries one command. Requests are ASCII of the shape
//! `cmd$args` with exactly one `$` separator; leading whitespace before the
//! command and between `$` and the args is ignored, and anything from the
//! first NUL on is discarded (clients send C strings). Replies are framed as
//! `<channel_byte><text>\n\0` — the channel byte tells the client which log
//! the line belongs to.

/// Maximum datagram payload, including the trailing NUL.
pub const BUFFER_SIZE: usize = 1024;
/// Maximum display/room name storage, including the trailing NUL.
/// Names themselves are at most `MAX_NAME_LEN - 1` bytes.
pub const MAX_NAME_LEN: usize = 64;
/// Well-known server port.
pub const DEFAULT_PORT: u16 = 12000;
/// Source port that grants admin rights (`kick`, `kickroom`).
pub const DEFAULT_ADMIN_PORT: u16 = 6666;

/// Logical destination of an outgoing datagram, encoded as its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Global,
    Room,
    Private,
}

impl Channel {
    pub fn byte(self) -> u8 {
        match self {
            Channel::Global => 0x00,
            Channel::Room => 0x01,
            Channel::Private => 0x02,
        }
    }
}

/// Frame a reply: channel byte, text, `\n` (added if absent), terminating NUL.
pub fn frame(channel: Channel, text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 3);
    out.push(channel.byte());
    out.extend_from_slice(text.as_bytes());
    if !text.ends_with('\n') {
        out.push(b'\n');
    }
    out.push(0);
    out
}

/// A parsed request. Borrows from the datagram payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Conn { name: &'a str },
    Disconn,
    Say { text: &'a str },
    SayTo { recipient: &'a str, text: &'a str },
    Mute { target: &'a str },
    Unmute { target: &'a str },
    Rename { new_name: &'a str },
    Kick { target: &'a str },
    CreateRoom { name: &'a str },
    JoinRoom { name: &'a str },
    SayRoom { text: &'a str },
    LeaveRoom,
    KickRoom { target: &'a str },
    RePing,
}

fn skip_spaces(s: &str) -> &str {
    s.trim_start_matches([' ', '\t'])
}

/// Parse one datagram into a [`Command`].
///
/// Returns `None` for anything malformed: no `$`, empty or unknown command
/// word, non-UTF-8 bytes, or a two-field command missing its second field.
/// Callers drop `None` silently.
pub fn parse(payload: &[u8]) -> Option<Command<'_>> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    let text = std::str::from_utf8(&payload[..end]).ok()?;

    let text = skip_spaces(text);
    let (cmd, args) = text.split_once('$')?;
    let args = skip_spaces(args).trim_end_matches(['\r', '\n']);

    match cmd {
        "conn" => Some(Command::Conn { name: args }),
        "disconn" => Some(Command::Disconn),
        "say" => Some(Command::Say { text: args }),
        "sayto" => {
            let (recipient, text) = args.split_once(' ')?;
            Some(Command::SayTo { recipient, text })
        }
        "mute" => Some(Command::Mute { target: args }),
        "unmute" => Some(Command::Unmute { target: args }),
        "rename" => Some(Command::Rename { new_name: args }),
        "kick" => Some(Command::Kick { target: args }),
        "createroom" => Some(Command::CreateRoom { name: args }),
        "joinroom" => Some(Command::JoinRoom { name: args }),
        "sayroom" => Some(Command::SayRoom { text: args }),
        "leaveroom" => Some(Command::LeaveRoom),
        "kickroom" => Some(Command::KickRoom { target: args }),
        "re-ping" => Some(Command::RePing),
        _ => None,
    }
}

/// True if `name` fits the protocol's name rules: non-empty and at most
/// `MAX_NAME_LEN - 1` bytes. Applies to both display names and room names.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() < MAX_NAME_LEN
}
