// Protocol engine: drives the receiver state machine against the virtual disk

use crate::state::{Action, ReceiverState, ACK, NACK, SEND_FLAG_COMPRESSED};
use byteorder::{BigEndian, WriteBytesExt};
use serialdisk_core::SerialDiskResult;
use serialdisk_filesystems::Disk;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct ProtocolEngine {
    disk: Disk,
    state: ReceiverState,
    compression: bool,
    transfer_started: Option<Instant>,
}

impl ProtocolEngine {
    pub fn new(disk: Disk, compression: bool) -> Self {
        Self {
            disk,
            state: ReceiverState::default(),
            compression,
            transfer_started: None,
        }
    }

    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    pub fn state(&self) -> &ReceiverState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Re-import the local directory if it changed, but only between exchanges.
    pub fn refresh_if_media_changed(&mut self) -> SerialDiskResult<bool> {
        if !self.is_idle() || !self.disk.take_media_changed() {
            return Ok(false);
        }

        info!("Local directory changed, re-importing");
        self.disk.reimport()?;
        Ok(true)
    }

    /// Feed one received byte; replies are written to `output`. An error is
    /// fatal to the connection.
    pub fn process_byte<W: Write>(&mut self, byte: u8, output: &mut W) -> SerialDiskResult<()> {
        let bytes_per_sector = self.disk.geometry().bytes_per_sector as usize;
        let state = std::mem::take(&mut self.state);
        let (next, action) = state.step(byte, bytes_per_sector);
        self.state = next;

        if matches!(self.state, ReceiverState::ReceiveData { .. }) && self.transfer_started.is_none() {
            self.transfer_started = Some(Instant::now());
        }

        match action {
            Action::None => {}
            Action::SendData { index, count } => self.send_data(index, count, output)?,
            Action::SendBiosParameterBlock => {
                debug!("Sending BIOS parameter block");
                output.write_all(&self.disk.bios_parameter_block())?;
                output.flush()?;
            }
            Action::CommitWrite { index, data } => {
                output.write_all(&[ACK])?;
                output.flush()?;
                self.log_transfer_rate(data.len());

                debug!("Writing {} bytes at sector {}", data.len(), index);
                let report = self.disk.write_sectors(data.len(), index as u32, &data);
                if report.has_failures() {
                    warn!("Sync after write at sector {}: {}", index, report);
                } else if !report.is_empty() {
                    info!("Sync after write at sector {}: {}", index, report);
                }
            }
            Action::RejectWrite { index, count } => {
                debug!("CRC32 mismatch writing {} sectors at {}, requesting resend", count, index);
                output.write_all(&[NACK])?;
                output.flush()?;
                self.transfer_started = Some(Instant::now());
            }
        }

        Ok(())
    }

    fn send_data<W: Write>(&mut self, index: u16, count: u16, output: &mut W) -> SerialDiskResult<()> {
        let started = Instant::now();
        let data = self.disk.read_sectors(index as u32, count as u32);
        let crc = crc32fast::hash(&data);

        let sent = if self.compression {
            let compressed = lz4_flex::block::compress(&data);
            debug!(
                "Compression: {:.2}% of {} bytes",
                100.0 * compressed.len() as f64 / data.len().max(1) as f64,
                data.len()
            );
            output.write_u8(SEND_FLAG_COMPRESSED)?;
            output.write_u32::<BigEndian>(compressed.len() as u32)?;
            output.write_all(&compressed)?;
            compressed.len()
        } else {
            output.write_u8(0)?;
            output.write_all(&data)?;
            data.len()
        };
        output.write_u32::<BigEndian>(crc)?;
        output.flush()?;

        let elapsed = started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            debug!(
                "Sent {} sectors from {} ({} bytes, {:.0} bytes/s)",
                count,
                index,
                sent,
                sent as f64 / elapsed
            );
        }
        Ok(())
    }

    fn log_transfer_rate(&mut self, bytes: usize) {
        if let Some(started) = self.transfer_started.take() {
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                info!("Received {} bytes ({:.0} bytes/s)", bytes, bytes as f64 / elapsed);
            }
        }
    }
}
