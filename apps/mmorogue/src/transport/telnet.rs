//! Telnet option negotiation.
//!
//! [`Negotiator`] is a sans-IO state machine: it is fed raw bytes from the
//! connection and splits them into application data and negotiation replies.
//! State is kept on the negotiator, so a command split across two network reads
//! resumes where it left off.
//!
//! Supported options:
//! - `DO ECHO` / `DO SUPPRESS-GO-AHEAD` are confirmed with `WILL`.
//! - `WILL TERMINAL-TYPE` / `WILL TERMINAL-SPEED` trigger a `SB <opt> SEND` request.
//! - `SB NAWS`, `SB TERMINAL-TYPE IS`, `SB TERMINAL-SPEED IS` are recorded in
//!   [`TerminalInfo`].
//!
//! Everything else is refused (`DO x` => `WONT x`, `WILL x` => `DONT x`) or
//! silently ignored.

use tracing::trace;

pub const SE: u8 = 240;
pub const NOP: u8 = 241;
pub const SB: u8 = 250;
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;
pub const IAC: u8 = 255;

pub const ECHO: u8 = 1;
pub const SUPPRESS_GO_AHEAD: u8 = 3;
pub const TERMINAL_TYPE: u8 = 24;
pub const WINDOW_SIZE: u8 = 31;
pub const TERMINAL_SPEED: u8 = 32;
pub const LINE_MODE: u8 = 34;

/// Sub-negotiation verbs (RFC 1091 / RFC 1079).
const SUB_IS: u8 = 0;
const SUB_SEND: u8 = 1;

/// Upper bound on `SB TERMINAL-TYPE SEND` requests per connection. Clients
/// cycle through their supported types on each request.
pub const MAX_TERMINAL_TYPE_REQUESTS: u8 = 4;

/// Payload bytes kept for a single sub-negotiation; the rest is dropped.
const MAX_SUBNEGOTIATION_BYTES: usize = 256;

const KNOWN_TERMINAL_PREFIXES: &[&str] = &[
    "xterm", "vt100", "vt102", "vt220", "ansi", "linux", "screen", "tmux", "rxvt", "putty",
    "konsole", "alacritty",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Normal,
    GotEscape,
    GotSb,
    GotWill,
    GotWont,
    GotDo,
    GotDont,
}

/// What the peer has told us about its terminal so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalInfo {
    /// `(width, height)` from NAWS.
    pub window_size: Option<(u16, u16)>,
    pub terminal_type: Option<String>,
    pub terminal_speed: Option<String>,
}

#[derive(Debug, Default)]
pub struct Negotiator {
    state: NegotiationState,
    /// Option code of the open sub-negotiation, if any.
    sub_option: Option<u8>,
    sub_buffer: Vec<u8>,
    terminal: TerminalInfo,
    terminal_type_requests: u8,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed sequence a server sends right after accepting a connection.
    pub fn offer() -> Vec<u8> {
        vec![
            IAC,
            WILL,
            ECHO,
            IAC,
            DO,
            SUPPRESS_GO_AHEAD,
            IAC,
            DO,
            WINDOW_SIZE,
            IAC,
            DO,
            TERMINAL_TYPE,
            IAC,
            DO,
            TERMINAL_SPEED,
            IAC,
            WONT,
            LINE_MODE,
        ]
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn in_subnegotiation(&self) -> bool {
        self.sub_option.is_some()
    }

    pub fn terminal(&self) -> &TerminalInfo {
        &self.terminal
    }

    /// Feed raw connection bytes. Application bytes are appended to `data`;
    /// bytes that must be written back to the peer are appended to `replies`.
    pub fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            match self.state {
                NegotiationState::Normal => {
                    if byte == IAC {
                        self.state = NegotiationState::GotEscape;
                    } else {
                        self.push_payload(byte, data);
                    }
                }
                NegotiationState::GotEscape => self.on_command(byte, data, replies),
                NegotiationState::GotSb => {
                    self.sub_option = Some(byte);
                    self.sub_buffer.clear();
                    self.state = NegotiationState::Normal;
                }
                NegotiationState::GotWill => {
                    self.on_will(byte, replies);
                    self.state = NegotiationState::Normal;
                }
                NegotiationState::GotDo => {
                    self.on_do(byte, replies);
                    self.state = NegotiationState::Normal;
                }
                NegotiationState::GotWont | NegotiationState::GotDont => {
                    trace!(target: "mmorogue::telnet", option = byte, state = ?self.state, "peer declined option");
                    self.state = NegotiationState::Normal;
                }
            }
        }
    }

    fn push_payload(&mut self, byte: u8, data: &mut Vec<u8>) {
        if self.sub_option.is_some() {
            if self.sub_buffer.len() < MAX_SUBNEGOTIATION_BYTES {
                self.sub_buffer.push(byte);
            }
        } else {
            data.push(byte);
        }
    }

    fn on_command(&mut self, byte: u8, data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        self.state = match byte {
            IAC => {
                self.push_payload(IAC, data);
                NegotiationState::Normal
            }
            SB => NegotiationState::GotSb,
            WILL => NegotiationState::GotWill,
            WONT => NegotiationState::GotWont,
            DO => NegotiationState::GotDo,
            DONT => NegotiationState::GotDont,
            SE => {
                if let Some(option) = self.sub_option.take() {
                    let payload = std::mem::take(&mut self.sub_buffer);
                    self.on_subnegotiation(option, &payload, replies);
                }
                NegotiationState::Normal
            }
            other => {
                trace!(target: "mmorogue::telnet", command = other, "ignoring telnet command");
                NegotiationState::Normal
            }
        };
    }

    fn on_will(&mut self, option: u8, replies: &mut Vec<u8>) {
        match option {
            TERMINAL_TYPE => self.request_terminal_type(replies),
            TERMINAL_SPEED => replies.extend_from_slice(&[IAC, SB, TERMINAL_SPEED, SUB_SEND, IAC, SE]),
            WINDOW_SIZE | SUPPRESS_GO_AHEAD => {}
            other => replies.extend_from_slice(&[IAC, DONT, other]),
        }
    }

    fn on_do(&mut self, option: u8, replies: &mut Vec<u8>) {
        match option {
            ECHO | SUPPRESS_GO_AHEAD => replies.extend_from_slice(&[IAC, WILL, option]),
            other => replies.extend_from_slice(&[IAC, WONT, other]),
        }
    }

    fn request_terminal_type(&mut self, replies: &mut Vec<u8>) {
        if self.terminal_type_requests >= MAX_TERMINAL_TYPE_REQUESTS {
            return;
        }
        self.terminal_type_requests += 1;
        replies.extend_from_slice(&[IAC, SB, TERMINAL_TYPE, SUB_SEND, IAC, SE]);
    }

    fn on_subnegotiation(&mut self, option: u8, payload: &[u8], replies: &mut Vec<u8>) {
        match option {
            WINDOW_SIZE => {
                if let [w0, w1, h0, h1, ..] = *payload {
                    let size = (u16::from_be_bytes([w0, w1]), u16::from_be_bytes([h0, h1]));
                    trace!(target: "mmorogue::telnet", width = size.0, height = size.1, "window size");
                    self.terminal.window_size = Some(size);
                }
            }
            TERMINAL_TYPE => {
                let Some((&SUB_IS, name)) = payload.split_first() else {
                    return;
                };
                let name = printable(name);
                trace!(target: "mmorogue::telnet", terminal_type = %name, "terminal type");
                let repeated = self.terminal.terminal_type.as_deref() == Some(name.as_str());
                let known = is_known_terminal(&name);
                self.terminal.terminal_type = Some(name);
                // A client repeats its last entry once its list is exhausted.
                if !known && !repeated {
                    self.request_terminal_type(replies);
                }
            }
            TERMINAL_SPEED => {
                if let Some((&SUB_IS, speed)) = payload.split_first() {
                    self.terminal.terminal_speed = Some(printable(speed));
                }
            }
            other => {
                trace!(target: "mmorogue::telnet", option = other, len = payload.len(), "ignoring sub-negotiation");
            }
        }
    }
}

fn printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| (0x20..0x7f).contains(*b))
        .map(|&b| b as char)
        .collect()
}

fn is_known_terminal(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    KNOWN_TERMINAL_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}
