//! The handful of ANSI control sequences the server emits.

use std::io::Write;

pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J";
pub const HIDE_CURSOR: &[u8] = b"\x1b[?25l";
pub const SHOW_CURSOR: &[u8] = b"\x1b[?25h";

/// Append a cursor move to the 0-based `(x, y)`; terminals count from 1.
pub fn move_to(out: &mut Vec<u8>, x: usize, y: usize) {
    // Writing into a Vec cannot fail.
    let _ = write!(out, "\x1b[{};{}H", y + 1, x + 1);
}

pub fn cursor_visibility(show: bool) -> &'static [u8] {
    if show {
        SHOW_CURSOR
    } else {
        HIDE_CURSOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_to_is_one_based() {
        let mut out = Vec::new();
        move_to(&mut out, 0, 0);
        move_to(&mut out, 79, 23);
        assert_eq!(out, b"\x1b[1;1H\x1b[24;80H");
    }
}
