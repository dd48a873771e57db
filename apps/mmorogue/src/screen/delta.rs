use crate::transport::ansi;

/// One run of changed cells: the current bytes starting at `(col, row)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenDelta {
    pub row: usize,
    pub col: usize,
    pub bytes: Vec<u8>,
}

impl ScreenDelta {
    /// Append the cursor move and the run's bytes.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        ansi::move_to(out, self.col, self.row);
        out.extend_from_slice(&self.bytes);
    }
}

/// Encode a whole delta as one output chunk.
pub fn encode_deltas(deltas: &[ScreenDelta]) -> Vec<u8> {
    let payload: usize = deltas.iter().map(|d| d.bytes.len() + 8).sum();
    let mut out = Vec::with_capacity(payload);
    for delta in deltas {
        delta.encode_into(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_run_is_prefixed_by_a_cursor_move() {
        let deltas = vec![
            ScreenDelta {
                row: 0,
                col: 3,
                bytes: b"ab".to_vec(),
            },
            ScreenDelta {
                row: 10,
                col: 0,
                bytes: b"@".to_vec(),
            },
        ];
        assert_eq!(encode_deltas(&deltas), b"\x1b[1;4Hab\x1b[11;1H@");
    }

    #[test]
    fn empty_delta_encodes_to_nothing() {
        assert!(encode_deltas(&[]).is_empty());
    }
}
