// Run length encoding of write payloads sent by the remote
//
// A run of 2..=255 equal bytes B is sent as B, B, count. Any other byte is sent
// as itself. The decoder treats the second B as a run marker and the byte after
// it as the total run length, so it emits count - 1 further copies. A count of
// 1 or 0 emits nothing further.

pub const MAX_RUN_LENGTH: usize = 255;

/// Incremental decoder, fed one byte at a time by the receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RleDecoder {
    previous: Option<u8>,
    in_run: bool,
}

impl RleDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `byte` into `out`, never growing it past `limit` bytes.
    pub fn push(&mut self, byte: u8, out: &mut Vec<u8>, limit: usize) {
        if self.in_run {
            if let Some(repeated) = self.previous {
                let copies = (byte as usize).saturating_sub(1);
                let copies = copies.min(limit.saturating_sub(out.len()));
                out.extend(std::iter::repeat(repeated).take(copies));
            }
            self.in_run = false;
            self.previous = None;
        } else if self.previous == Some(byte) {
            self.in_run = true;
        } else if out.len() < limit {
            out.push(byte);
            self.previous = Some(byte);
        }
    }
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        let run = data[i..]
            .iter()
            .take(MAX_RUN_LENGTH)
            .take_while(|&&b| b == byte)
            .count();

        if run >= 2 {
            encoded.extend_from_slice(&[byte, byte, run as u8]);
        } else {
            encoded.push(byte);
        }
        i += run;
    }

    encoded
}

pub fn decode(encoded: &[u8]) -> Vec<u8> {
    let mut decoder = RleDecoder::new();
    let mut out = Vec::new();
    for &byte in encoded {
        decoder.push(byte, &mut out, usize::MAX);
    }
    out
}
