use std::ops::Deref;

use bytes::Bytes;

const ESC: u8 = 0x1b;
/// Longest escape token, e.g. `ESC [ 1 5 ~`.
const MAX_ESCAPE_LEN: usize = 5;

/// One unit of player input: a keystroke, an escape sequence, or a line end
/// (always normalised to `\r\n`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(Bytes);

impl Command {
    pub const LINE_END: &'static [u8] = b"\r\n";

    pub fn line_end() -> Self {
        Self(Bytes::from_static(Self::LINE_END))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_line_end(&self) -> bool {
        self.as_bytes() == Self::LINE_END
    }
}

impl Deref for Command {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Command {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<Bytes> for Command {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

/// Cut decoded input into command tokens.
///
/// `ESC [` or `ESC O` starts an escape token of three bytes, extended up to a
/// `~` terminator when the third byte is a digit (`ESC [ 3 ~`). Any other ESC
/// is a token by itself. CR LF, CR NUL, lone CR, and bare LF all become one
/// line-end token. Everything else is one byte per token.
///
/// `input` is taken as complete: an escape cut off at the end becomes a token
/// of whatever arrived. Use [`CommandSplitter`] for input that arrives in
/// chunks.
pub fn split_commands(input: &[u8]) -> Vec<Command> {
    split(input, true).commands
}

/// Splits a stream of chunks into command tokens. An escape sequence or a
/// CR LF pair cut by a read boundary is joined with the next chunk.
#[derive(Debug, Default)]
pub struct CommandSplitter {
    partial: Vec<u8>,
    after_return: bool,
}

impl CommandSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Command> {
        let mut input = std::mem::take(&mut self.partial);
        input.extend_from_slice(chunk);
        if input.is_empty() {
            return Vec::new();
        }
        let mut start = 0;
        if self.after_return {
            self.after_return = false;
            if matches!(input[0], b'\n' | 0) {
                start = 1;
            }
        }
        let split = split(&input[start..], false);
        self.after_return = split.ends_with_return;
        self.partial = input[input.len() - split.unfinished..].to_vec();
        split.commands
    }

    /// True while the tail of an escape sequence is still expected.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Give up waiting: emit the held escape bytes as they are. A lone ESC
    /// key press ends up here.
    pub fn flush(&mut self) -> Vec<Command> {
        let held = std::mem::take(&mut self.partial);
        split(&held, true).commands
    }
}

struct Split {
    commands: Vec<Command>,
    /// Length of the unfinished escape at the end of the input.
    unfinished: usize,
    ends_with_return: bool,
}

fn split(input: &[u8], complete: bool) -> Split {
    let mut commands = Vec::new();
    let mut ends_with_return = false;
    let mut i = 0;
    while i < input.len() {
        ends_with_return = false;
        let end = match input[i] {
            ESC => match escape_end(input, i) {
                Some(end) => end,
                None if complete => input.len(),
                None => {
                    return Split {
                        commands,
                        unfinished: input.len() - i,
                        ends_with_return: false,
                    }
                }
            },
            b'\r' => {
                commands.push(Command::line_end());
                match input.get(i + 1) {
                    Some(b'\n') | Some(0) => i += 2,
                    Some(_) => i += 1,
                    None => {
                        i += 1;
                        ends_with_return = true;
                    }
                }
                continue;
            }
            b'\n' => {
                commands.push(Command::line_end());
                i += 1;
                continue;
            }
            _ => i + 1,
        };
        commands.push(Command::from(&input[i..end]));
        i = end;
    }
    Split {
        commands,
        unfinished: 0,
        ends_with_return,
    }
}

/// End of the escape token at `start`, or `None` if the input stops before
/// the token is decided.
fn escape_end(input: &[u8], start: usize) -> Option<usize> {
    match input.get(start + 1)? {
        b'[' | b'O' => {}
        _ => return Some(start + 1),
    }
    if !input.get(start + 2)?.is_ascii_digit() {
        return Some(start + 3);
    }
    for i in start + 3..start + MAX_ESCAPE_LEN {
        if *input.get(i)? == b'~' {
            return Some(i + 1);
        }
    }
    Some(start + 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &[u8]) -> Vec<Vec<u8>> {
        split_commands(input).iter().map(|c| c.to_vec()).collect()
    }

    #[test]
    fn single_keys_are_single_tokens() {
        assert_eq!(tokens(b"ab"), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn arrow_keys() {
        assert_eq!(
            tokens(b"\x1b[A\x1b[Dx"),
            vec![b"\x1b[A".to_vec(), b"\x1b[D".to_vec(), b"x".to_vec()]
        );
        assert_eq!(tokens(b"\x1bOB"), vec![b"\x1bOB".to_vec()]);
    }

    #[test]
    fn tilde_terminated_keys() {
        assert_eq!(
            tokens(b"\x1b[3~\x1b[15~q"),
            vec![b"\x1b[3~".to_vec(), b"\x1b[15~".to_vec(), b"q".to_vec()]
        );
    }

    #[test]
    fn lone_escape() {
        assert_eq!(tokens(b"\x1b"), vec![b"\x1b".to_vec()]);
        assert_eq!(tokens(b"\x1bx"), vec![b"\x1b".to_vec(), b"x".to_vec()]);
    }

    #[test]
    fn truncated_escape_in_complete_input_keeps_what_arrived() {
        assert_eq!(tokens(b"\x1b["), vec![b"\x1b[".to_vec()]);
        assert_eq!(tokens(b"\x1b[1"), vec![b"\x1b[1".to_vec()]);
    }

    #[test]
    fn digit_without_tilde_is_three_bytes() {
        assert_eq!(
            tokens(b"\x1b[12xy"),
            vec![b"\x1b[1".to_vec(), b"2".to_vec(), b"x".to_vec(), b"y".to_vec()]
        );
    }

    fn fed(splitter: &mut CommandSplitter, chunk: &[u8]) -> Vec<Vec<u8>> {
        splitter.feed(chunk).iter().map(|c| c.to_vec()).collect()
    }

    #[test]
    fn escape_split_across_chunks_is_joined() {
        let mut splitter = CommandSplitter::new();
        assert_eq!(fed(&mut splitter, b"hi"), vec![b"h".to_vec(), b"i".to_vec()]);
        assert!(fed(&mut splitter, b"\x1b").is_empty());
        assert!(splitter.has_partial());
        assert_eq!(fed(&mut splitter, b"[A"), vec![b"\x1b[A".to_vec()]);
        assert!(!splitter.has_partial());

        assert!(fed(&mut splitter, b"\x1b[1").is_empty());
        assert!(fed(&mut splitter, b"5").is_empty());
        assert_eq!(fed(&mut splitter, b"~q"), vec![b"\x1b[15~".to_vec(), b"q".to_vec()]);
    }

    #[test]
    fn held_lone_escape_is_released_by_flush_or_next_key() {
        let mut splitter = CommandSplitter::new();
        assert!(fed(&mut splitter, b"ab\x1b").len() == 2);
        let flushed: Vec<Vec<u8>> = splitter.flush().iter().map(|c| c.to_vec()).collect();
        assert_eq!(flushed, vec![b"\x1b".to_vec()]);
        assert!(!splitter.has_partial());

        fed(&mut splitter, b"\x1b");
        assert_eq!(fed(&mut splitter, b"x"), vec![b"\x1b".to_vec(), b"x".to_vec()]);
    }

    #[test]
    fn line_end_split_across_chunks_is_one_token() {
        let mut splitter = CommandSplitter::new();
        assert_eq!(fed(&mut splitter, b"a\r"), vec![b"a".to_vec(), b"\r\n".to_vec()]);
        assert_eq!(fed(&mut splitter, b"\nb"), vec![b"b".to_vec()]);
        assert_eq!(fed(&mut splitter, b"\r"), vec![b"\r\n".to_vec()]);
        assert_eq!(fed(&mut splitter, b"\0"), Vec::<Vec<u8>>::new());
        assert_eq!(fed(&mut splitter, b"\r"), vec![b"\r\n".to_vec()]);
        assert_eq!(fed(&mut splitter, b"c"), vec![b"c".to_vec()]);
    }

    #[test]
    fn line_endings_normalise() {
        let expected = vec![b"a".to_vec(), b"\r\n".to_vec(), b"b".to_vec()];
        assert_eq!(tokens(b"a\r\nb"), expected);
        assert_eq!(tokens(b"a\r\0b"), expected);
        assert_eq!(tokens(b"a\rb"), expected);
        assert_eq!(tokens(b"a\nb"), expected);
        assert!(split_commands(b"\r")[0].is_line_end());
    }
}
