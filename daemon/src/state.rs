// Receiver state machine
//
// Every exchange starts with the preamble 0x18 0x03 0x20 0x06 followed by a
// command byte. Sector index and count are big-endian u16. A write payload is
// a flags byte, the (optionally RLE encoded) sector data and a big-endian
// CRC32 of the decoded data.

use crate::rle::RleDecoder;

pub const PREAMBLE: [u8; 4] = [0x18, 0x03, 0x20, 0x06];

/// Command selectors following the preamble
pub mod commands {
    pub const READ: u8 = 0;
    pub const WRITE: u8 = 1;
    pub const BIOS_PARAMETER_BLOCK: u8 = 2;
}

/// Write payload flags: bit 0 set means RLE encoded
pub const RECEIVE_FLAG_RLE: u8 = 0x01;
/// Read reply flags: bit 0 set means an LZ4 block, length prefixed
pub const SEND_FLAG_COMPRESSED: u8 = 0x01;

pub const ACK: u8 = 0x02;
pub const NACK: u8 = 0x04;

const FIELD_BYTES: u8 = 2;
const CRC32_BYTES: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverState {
    ReceiveStartMagic {
        matched: usize,
    },
    ReceiveReadSectorIndex {
        index: u16,
        received: u8,
    },
    ReceiveReadSectorCount {
        index: u16,
        count: u16,
        received: u8,
    },
    ReceiveWriteSectorIndex {
        index: u16,
        received: u8,
    },
    ReceiveWriteSectorCount {
        index: u16,
        count: u16,
        received: u8,
    },
    ReceiveData {
        index: u16,
        count: u16,
        flags: Option<u8>,
        decoder: RleDecoder,
        data: Vec<u8>,
    },
    ReceiveCrc32 {
        index: u16,
        count: u16,
        data: Vec<u8>,
        crc: u32,
        received: u8,
    },
}

impl Default for ReceiverState {
    fn default() -> Self {
        ReceiverState::ReceiveStartMagic { matched: 0 }
    }
}

/// Side effect requested by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    SendData { index: u16, count: u16 },
    SendBiosParameterBlock,
    /// CRC32 matched: acknowledge and write `data` at sector `index`
    CommitWrite { index: u16, data: Vec<u8> },
    /// CRC32 mismatch: reject, the remote resends the payload
    RejectWrite { index: u16, count: u16 },
}

fn receive_data(index: u16, count: u16) -> ReceiverState {
    ReceiverState::ReceiveData {
        index,
        count,
        flags: None,
        decoder: RleDecoder::new(),
        data: Vec::new(),
    }
}

fn receive_crc32(index: u16, count: u16, data: Vec<u8>) -> ReceiverState {
    ReceiverState::ReceiveCrc32 { index, count, data, crc: 0, received: 0 }
}

impl ReceiverState {
    /// Waiting for a new exchange with no partial preamble.
    pub fn is_idle(&self) -> bool {
        matches!(self, ReceiverState::ReceiveStartMagic { matched: 0 })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReceiverState::ReceiveStartMagic { .. } => "ReceiveStartMagic",
            ReceiverState::ReceiveReadSectorIndex { .. } => "ReceiveReadSectorIndex",
            ReceiverState::ReceiveReadSectorCount { .. } => "ReceiveReadSectorCount",
            ReceiverState::ReceiveWriteSectorIndex { .. } => "ReceiveWriteSectorIndex",
            ReceiverState::ReceiveWriteSectorCount { .. } => "ReceiveWriteSectorCount",
            ReceiverState::ReceiveData { .. } => "ReceiveData",
            ReceiverState::ReceiveCrc32 { .. } => "ReceiveCRC32",
        }
    }

    /// Consume one received byte.
    pub fn step(self, byte: u8, bytes_per_sector: usize) -> (ReceiverState, Action) {
        use ReceiverState::*;

        match self {
            ReceiveStartMagic { matched } if matched < PREAMBLE.len() => {
                let matched = if byte == PREAMBLE[matched] { matched + 1 } else { 0 };
                (ReceiveStartMagic { matched }, Action::None)
            }

            ReceiveStartMagic { .. } => match byte {
                commands::READ => (ReceiveReadSectorIndex { index: 0, received: 0 }, Action::None),
                commands::WRITE => (ReceiveWriteSectorIndex { index: 0, received: 0 }, Action::None),
                commands::BIOS_PARAMETER_BLOCK => (ReceiverState::default(), Action::SendBiosParameterBlock),
                _ => (ReceiverState::default(), Action::None),
            },

            ReceiveReadSectorIndex { index, received } => {
                let index = index << 8 | byte as u16;
                if received + 1 < FIELD_BYTES {
                    (ReceiveReadSectorIndex { index, received: received + 1 }, Action::None)
                } else {
                    (ReceiveReadSectorCount { index, count: 0, received: 0 }, Action::None)
                }
            }

            ReceiveReadSectorCount { index, count, received } => {
                let count = count << 8 | byte as u16;
                if received + 1 < FIELD_BYTES {
                    (ReceiveReadSectorCount { index, count, received: received + 1 }, Action::None)
                } else {
                    (ReceiverState::default(), Action::SendData { index, count })
                }
            }

            ReceiveWriteSectorIndex { index, received } => {
                let index = index << 8 | byte as u16;
                if received + 1 < FIELD_BYTES {
                    (ReceiveWriteSectorIndex { index, received: received + 1 }, Action::None)
                } else {
                    (ReceiveWriteSectorCount { index, count: 0, received: 0 }, Action::None)
                }
            }

            ReceiveWriteSectorCount { index, count, received } => {
                let count = count << 8 | byte as u16;
                if received + 1 < FIELD_BYTES {
                    (ReceiveWriteSectorCount { index, count, received: received + 1 }, Action::None)
                } else {
                    (receive_data(index, count), Action::None)
                }
            }

            ReceiveData { index, count, flags, mut decoder, mut data } => {
                let target = count as usize * bytes_per_sector;

                match flags {
                    None => {
                        if target == 0 {
                            return (receive_crc32(index, count, data), Action::None);
                        }
                        let flags = Some(byte);
                        (ReceiveData { index, count, flags, decoder, data }, Action::None)
                    }
                    Some(flags) => {
                        if flags & RECEIVE_FLAG_RLE != 0 {
                            decoder.push(byte, &mut data, target);
                        } else {
                            data.push(byte);
                        }

                        if data.len() >= target {
                            (receive_crc32(index, count, data), Action::None)
                        } else {
                            (ReceiveData { index, count, flags: Some(flags), decoder, data }, Action::None)
                        }
                    }
                }
            }

            ReceiveCrc32 { index, count, data, crc, received } => {
                let crc = crc << 8 | byte as u32;
                if received + 1 < CRC32_BYTES {
                    return (ReceiveCrc32 { index, count, data, crc, received: received + 1 }, Action::None);
                }

                if crc == crc32fast::hash(&data) {
                    (ReceiverState::default(), Action::CommitWrite { index, data })
                } else {
                    (receive_data(index, count), Action::RejectWrite { index, count })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(mut state: ReceiverState, bytes: &[u8]) -> (ReceiverState, Vec<Action>) {
        let mut actions = Vec::new();
        for &byte in bytes {
            let (next, action) = state.step(byte, 512);
            state = next;
            if action != Action::None {
                actions.push(action);
            }
        }
        (state, actions)
    }

    fn preamble(command: u8) -> Vec<u8> {
        let mut bytes = PREAMBLE.to_vec();
        bytes.push(command);
        bytes
    }

    #[test]
    fn test_preamble_mismatch_resets() {
        let (state, actions) = feed(ReceiverState::default(), &[0x18, 0x03, 0x99]);
        assert_eq!(state, ReceiverState::ReceiveStartMagic { matched: 0 });
        assert!(actions.is_empty());

        // The mismatching byte is not rechecked against the first sync byte
        let (state, _) = feed(ReceiverState::default(), &[0x18, 0x18, 0x03, 0x20, 0x06]);
        assert_eq!(state, ReceiverState::ReceiveStartMagic { matched: 0 });
    }

    #[test]
    fn test_bios_parameter_block_command() {
        let (state, actions) = feed(ReceiverState::default(), &preamble(commands::BIOS_PARAMETER_BLOCK));
        assert!(state.is_idle());
        assert_eq!(actions, vec![Action::SendBiosParameterBlock]);
    }

    #[test]
    fn test_unknown_command_resynchronizes() {
        let (state, actions) = feed(ReceiverState::default(), &preamble(9));
        assert!(state.is_idle());
        assert!(actions.is_empty());
    }

    #[test]
    fn test_read_fields_are_big_endian() {
        let mut bytes = preamble(commands::READ);
        bytes.extend_from_slice(&[0x01, 0x02, 0x00, 0x03]);
        let (state, actions) = feed(ReceiverState::default(), &bytes);

        assert!(state.is_idle());
        assert_eq!(actions, vec![Action::SendData { index: 0x0102, count: 3 }]);
    }

    #[test]
    fn test_write_commits_on_matching_crc() {
        let payload = vec![0x5Au8; 512];
        let mut bytes = preamble(commands::WRITE);
        bytes.extend_from_slice(&[0x00, 0x10, 0x00, 0x01, 0x00]);
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());

        let (state, actions) = feed(ReceiverState::default(), &bytes);
        assert!(state.is_idle());
        assert_eq!(actions, vec![Action::CommitWrite { index: 0x10, data: payload }]);
    }

    #[test]
    fn test_rle_payload_is_decoded() {
        let payload = vec![0u8; 512];
        let mut bytes = preamble(commands::WRITE);
        bytes.extend_from_slice(&[0x00, 0x10, 0x00, 0x01, RECEIVE_FLAG_RLE]);
        bytes.extend_from_slice(&crate::rle::encode(&payload));
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());

        let (_, actions) = feed(ReceiverState::default(), &bytes);
        assert_eq!(actions, vec![Action::CommitWrite { index: 0x10, data: payload }]);
    }

    #[test]
    fn test_crc_mismatch_returns_to_receive_data() {
        let mut bytes = preamble(commands::WRITE);
        bytes.extend_from_slice(&[0x00, 0x10, 0x00, 0x01, 0x00]);
        bytes.extend_from_slice(&[1u8; 512]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let (state, actions) = feed(ReceiverState::default(), &bytes);
        assert_eq!(actions, vec![Action::RejectWrite { index: 0x10, count: 1 }]);
        assert_eq!(state, receive_data(0x10, 1));
    }

    #[test]
    fn test_zero_sector_write_skips_payload() {
        let mut bytes = preamble(commands::WRITE);
        bytes.extend_from_slice(&[0x00, 0x10, 0x00, 0x00]);
        let (state, _) = feed(ReceiverState::default(), &bytes);
        assert_eq!(state.name(), "ReceiveData");

        // The flags byte position goes straight to the checksum
        let (state, _) = feed(state, &[0x00]);
        assert_eq!(state.name(), "ReceiveCRC32");
    }
}
