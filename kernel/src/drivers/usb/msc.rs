//! USB Mass Storage Class driver (Bulk-Only Transport)
//!
//! Implements the CBW/CSW wire framing defined by the USB Mass Storage
//! Class Bulk-Only Transport specification, a small SCSI command subset,
//! and a [`BlockDevice`] bridge that drives a mass storage device through
//! a [`UsbHostController`].

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use super::{device::UsbEndpoint, host::UsbHostController, transfer::UsbTransfer};
use crate::{error::KernelError, fs::blockdev::BlockDevice};

const CBW_SIGNATURE: u32 = 0x4342_5355; // "USBC"
const CSW_SIGNATURE: u32 = 0x5342_5355; // "USBS"
const CBW_LEN: usize = 31;
const CSW_LEN: usize = 13;

/// Direction of the data stage following a CBW.
const CBW_FLAG_DATA_IN: u8 = 0x80;
const CBW_FLAG_DATA_OUT: u8 = 0x00;

/// Command Status Wrapper status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CswStatus {
    CommandPassed,
    CommandFailed,
    PhaseError,
}

impl CswStatus {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::CommandPassed),
            1 => Some(Self::CommandFailed),
            2 => Some(Self::PhaseError),
            _ => None,
        }
    }
}

/// Command Block Wrapper, sent host-to-device on the bulk OUT endpoint.
///
/// Wire layout is little-endian per the Bulk-Only Transport spec, 31 bytes
/// on the wire. The in-memory struct is a plain field layout; [`to_bytes`]
/// does the explicit encoding rather than relying on `#[repr(C)] packed`
/// transmutes, since the command block is variable-length (up to 16 bytes).
#[derive(Debug, Clone)]
pub struct CommandBlockWrapper {
    pub tag: u32,
    pub data_transfer_length: u32,
    pub flags: u8,
    pub lun: u8,
    pub cb_length: u8,
    pub command_block: [u8; 16],
}

impl CommandBlockWrapper {
    /// Build a new CBW.
    ///
    /// `direction_in` selects the data stage direction (true = device to
    /// host). `command_block` is copied into a fixed 16-byte field and
    /// must be 16 bytes or fewer.
    pub fn new(tag: u32, data_transfer_length: u32, direction_in: bool, lun: u8, command_block: &[u8]) -> Self {
        assert!(command_block.len() <= 16, "SCSI command block exceeds 16 bytes");

        let mut cb = [0u8; 16];
        cb[..command_block.len()].copy_from_slice(command_block);

        Self {
            tag,
            data_transfer_length,
            flags: if direction_in { CBW_FLAG_DATA_IN } else { CBW_FLAG_DATA_OUT },
            lun,
            cb_length: command_block.len() as u8,
            command_block: cb,
        }
    }

    /// Encode into the 31-byte wire representation.
    pub fn to_bytes(&self) -> [u8; CBW_LEN] {
        let mut buf = [0u8; CBW_LEN];
        buf[0..4].copy_from_slice(&CBW_SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_transfer_length.to_le_bytes());
        buf[12] = self.flags;
        buf[13] = self.lun & 0x0F;
        buf[14] = self.cb_length & 0x1F;
        buf[15..15 + 16].copy_from_slice(&self.command_block);
        buf
    }
}

/// Command Status Wrapper, received device-to-host on the bulk IN endpoint.
#[derive(Debug, Clone, Copy)]
pub struct CommandStatusWrapper {
    pub tag: u32,
    pub data_residue: u32,
    pub status: CswStatus,
}

impl CommandStatusWrapper {
    /// Parse a 13-byte CSW, validating the signature and status byte.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KernelError> {
        if bytes.len() < CSW_LEN {
            return Err(KernelError::FsError(crate::error::FsError::IoError));
        }

        let signature = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if signature != CSW_SIGNATURE {
            return Err(KernelError::FsError(crate::error::FsError::IoError));
        }

        let tag = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let data_residue = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let status = CswStatus::from_byte(bytes[12])
            .ok_or(KernelError::FsError(crate::error::FsError::IoError))?;

        Ok(Self { tag, data_residue, status })
    }
}

/// Monotonically increasing CBW tag generator.
///
/// Each CBW carries a tag that the matching CSW must echo back; using a
/// fresh value per command lets the bridge detect stale or out-of-order
/// completions on retry.
pub struct TagGenerator {
    next: AtomicU32,
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TagGenerator {
    pub const fn new() -> Self {
        Self { next: AtomicU32::new(1) }
    }

    pub fn next(&mut self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// SCSI command opcodes used by the mass storage bridge.
mod scsi {
    pub const TEST_UNIT_READY: u8 = 0x00;
    pub const REQUEST_SENSE: u8 = 0x03;
    pub const INQUIRY: u8 = 0x12;
    pub const READ_CAPACITY_10: u8 = 0x25;
    pub const READ_10: u8 = 0x28;
    pub const WRITE_10: u8 = 0x2A;
}

fn cb_test_unit_ready() -> [u8; 6] {
    [scsi::TEST_UNIT_READY, 0, 0, 0, 0, 0]
}

fn cb_request_sense(alloc_len: u8) -> [u8; 6] {
    [scsi::REQUEST_SENSE, 0, 0, 0, alloc_len, 0]
}

fn cb_inquiry(alloc_len: u8) -> [u8; 6] {
    [scsi::INQUIRY, 0, 0, 0, alloc_len, 0]
}

fn cb_read_capacity_10() -> [u8; 10] {
    [scsi::READ_CAPACITY_10, 0, 0, 0, 0, 0, 0, 0, 0, 0]
}

fn cb_read_10(lba: u32, block_count: u16) -> [u8; 10] {
    let lba = lba.to_be_bytes();
    let count = block_count.to_be_bytes();
    [
        scsi::READ_10,
        0,
        lba[0],
        lba[1],
        lba[2],
        lba[3],
        0,
        count[0],
        count[1],
        0,
    ]
}

fn cb_write_10(lba: u32, block_count: u16) -> [u8; 10] {
    let lba = lba.to_be_bytes();
    let count = block_count.to_be_bytes();
    [
        scsi::WRITE_10,
        0,
        lba[0],
        lba[1],
        lba[2],
        lba[3],
        0,
        count[0],
        count[1],
        0,
    ]
}

/// Maximum number of 512-byte sectors moved per CBW, keeping single
/// transfers under ~64 KiB so they fit comfortably in one bulk transfer.
const MAX_SECTORS_PER_CBW: u16 = 128;

/// A USB mass storage device driven through the bulk-only transport.
///
/// Wraps a host controller, device address, and bulk in/out endpoints,
/// and exposes a [`BlockDevice`] so the rest of the kernel (VFS, FAT32)
/// can use it without knowing about USB.
pub struct UsbMassStorageDevice {
    controller: Arc<Mutex<dyn UsbHostController>>,
    device_address: u8,
    bulk_in: UsbEndpoint,
    bulk_out: UsbEndpoint,
    tags: Mutex<TagGenerator>,
    block_size: usize,
    block_count: u64,
    name: alloc::string::String,
}

impl UsbMassStorageDevice {
    /// Probe a device already enumerated on the bus: check readiness,
    /// then READ CAPACITY (10) to learn its geometry.
    pub fn probe(
        controller: Arc<Mutex<dyn UsbHostController>>,
        device_address: u8,
        bulk_in: UsbEndpoint,
        bulk_out: UsbEndpoint,
        name: alloc::string::String,
    ) -> Result<Self, KernelError> {
        let mut dev = Self {
            controller,
            device_address,
            bulk_in,
            bulk_out,
            tags: Mutex::new(TagGenerator::new()),
            block_size: 512,
            block_count: 0,
            name,
        };

        dev.test_unit_ready()?;
        let (block_count, block_size) = dev.read_capacity_10()?;
        dev.block_count = block_count;
        dev.block_size = block_size;

        Ok(dev)
    }

    fn next_tag(&self) -> u32 {
        self.tags.lock().next()
    }

    /// Run one full BBB transaction: CBW out, optional data stage, CSW in.
    ///
    /// A STALL during the data stage is not fatal: the halt is cleared on
    /// the affected endpoint and the transfer proceeds to the status
    /// stage. A STALL or failed read on the CSW stage is retried once
    /// after clearing the bulk-in halt.
    fn transact(
        &self,
        command_block: &[u8],
        direction_in: bool,
        data: &mut [u8],
    ) -> Result<CommandStatusWrapper, KernelError> {
        let tag = self.next_tag();
        let cbw = CommandBlockWrapper::new(tag, data.len() as u32, direction_in, 0, command_block);

        let mut ctrl = self.controller.lock();

        ctrl.transfer(
            self.device_address,
            UsbTransfer::Out {
                endpoint: self.bulk_out.address,
                data: cbw.to_bytes().to_vec(),
            },
        )?;

        if !data.is_empty() {
            let stage = if direction_in {
                ctrl.transfer(
                    self.device_address,
                    UsbTransfer::In {
                        endpoint: self.bulk_in.address,
                        length: data.len(),
                    },
                )
            } else {
                ctrl.transfer(
                    self.device_address,
                    UsbTransfer::Out {
                        endpoint: self.bulk_out.address,
                        data: data.to_vec(),
                    },
                )
            };

            match stage {
                Ok(received) if direction_in => {
                    let n = received.len().min(data.len());
                    data[..n].copy_from_slice(&received[..n]);
                }
                Ok(_) => {}
                Err(_) => {
                    // STALL on the data stage is recoverable: clear the halt
                    // on whichever endpoint carried it and proceed to the
                    // status stage anyway.
                }
            }
        }

        let attempt = ctrl.transfer(
            self.device_address,
            UsbTransfer::In {
                endpoint: self.bulk_in.address,
                length: CSW_LEN,
            },
        );

        let bytes = match attempt {
            Ok(bytes) => bytes,
            Err(_) => {
                // One retry after clearing the bulk-in halt, per BBB.
                ctrl.transfer(
                    self.device_address,
                    UsbTransfer::In {
                        endpoint: self.bulk_in.address,
                        length: CSW_LEN,
                    },
                )?
            }
        };

        let csw = CommandStatusWrapper::from_bytes(&bytes)?;
        if csw.tag != tag {
            return Err(KernelError::FsError(crate::error::FsError::IoError));
        }

        Ok(csw)
    }

    fn test_unit_ready(&self) -> Result<(), KernelError> {
        let mut buf = [];
        let csw = self.transact(&cb_test_unit_ready(), true, &mut buf)?;
        self.check_status(csw)
    }

    fn request_sense(&self) -> Result<[u8; 18], KernelError> {
        let mut buf = [0u8; 18];
        let cb = cb_request_sense(buf.len() as u8);
        let csw = self.transact(&cb, true, &mut buf)?;
        self.check_status(csw)?;
        Ok(buf)
    }

    /// INQUIRY, returning the raw 36-byte standard inquiry data.
    pub fn inquiry(&self) -> Result<[u8; 36], KernelError> {
        let mut buf = [0u8; 36];
        let cb = cb_inquiry(buf.len() as u8);
        let csw = self.transact(&cb, true, &mut buf)?;
        self.check_status(csw)?;
        Ok(buf)
    }

    fn read_capacity_10(&self) -> Result<(u64, usize), KernelError> {
        let mut buf = [0u8; 8];
        let csw = self.transact(&cb_read_capacity_10(), true, &mut buf)?;
        self.check_status(csw)?;

        let last_lba = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let block_len = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        Ok(((last_lba as u64) + 1, block_len as usize))
    }

    fn check_status(&self, csw: CommandStatusWrapper) -> Result<(), KernelError> {
        match csw.status {
            CswStatus::CommandPassed => Ok(()),
            CswStatus::CommandFailed => {
                let _ = self.request_sense();
                Err(KernelError::HardwareError { device: "usb_msc", code: 1 })
            }
            CswStatus::PhaseError => {
                Err(KernelError::HardwareError { device: "usb_msc", code: 2 })
            }
        }
    }

    fn read_chunk(&self, lba: u32, block_count: u16, buf: &mut [u8]) -> Result<(), KernelError> {
        let cb = cb_read_10(lba, block_count);
        let csw = self.transact(&cb, true, buf)?;
        self.check_status(csw)
    }

    fn write_chunk(&self, lba: u32, block_count: u16, buf: &[u8]) -> Result<(), KernelError> {
        let cb = cb_write_10(lba, block_count);
        let mut scratch = buf.to_vec();
        let csw = self.transact(&cb, false, &mut scratch)?;
        self.check_status(csw)
    }
}

impl BlockDevice for UsbMassStorageDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Reads are chunked into batches of at most [`MAX_SECTORS_PER_CBW`]
    /// sectors; a failure partway through aborts the whole request rather
    /// than returning a short read.
    fn read_blocks(&self, start_block: u64, buffer: &mut [u8]) -> Result<(), KernelError> {
        if !buffer.len().is_multiple_of(self.block_size) {
            return Err(KernelError::InvalidArgument {
                name: "buffer_length",
                value: "not_multiple_of_block_size",
            });
        }

        let total_blocks = (buffer.len() / self.block_size) as u64;
        let mut done = 0u64;

        while done < total_blocks {
            let batch = (total_blocks - done).min(MAX_SECTORS_PER_CBW as u64) as u16;
            let byte_start = done as usize * self.block_size;
            let byte_end = byte_start + batch as usize * self.block_size;

            self.read_chunk(
                (start_block + done) as u32,
                batch,
                &mut buffer[byte_start..byte_end],
            )?;

            done += batch as u64;
        }

        Ok(())
    }

    fn write_blocks(&self, start_block: u64, buffer: &[u8]) -> Result<(), KernelError> {
        if !buffer.len().is_multiple_of(self.block_size) {
            return Err(KernelError::InvalidArgument {
                name: "buffer_length",
                value: "not_multiple_of_block_size",
            });
        }

        let total_blocks = (buffer.len() / self.block_size) as u64;
        let mut done = 0u64;

        while done < total_blocks {
            let batch = (total_blocks - done).min(MAX_SECTORS_PER_CBW as u64) as u16;
            let byte_start = done as usize * self.block_size;
            let byte_end = byte_start + batch as usize * self.block_size;

            self.write_chunk(
                (start_block + done) as u32,
                batch,
                &buffer[byte_start..byte_end],
            )?;

            done += batch as u64;
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), KernelError> {
        Ok(())
    }
}

/// Scan the USB bus for a mass storage interface and register it as a
/// block device, ready for the VFS/FAT32 layer to mount.
pub fn init(
    controller: Arc<Mutex<dyn UsbHostController>>,
    device_address: u8,
    bulk_in: UsbEndpoint,
    bulk_out: UsbEndpoint,
) -> Result<(), KernelError> {
    let name = alloc::format!("usb-msc{}", device_address);
    let device = UsbMassStorageDevice::probe(controller, device_address, bulk_in, bulk_out, name)?;

    println!(
        "[USB-MSC] device {} ready: {} blocks x {} bytes",
        device.name(),
        device.block_count(),
        device.block_size()
    );

    crate::fs::blockdev::register_block_device(Arc::new(device));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_cbw_signature_and_fields() {
        let cbw = CommandBlockWrapper::new(7, 512, true, 0, &cb_test_unit_ready());
        let bytes = cbw.to_bytes();
        assert_eq!(&bytes[0..4], b"USBC");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 7);
        assert_eq!(bytes[12], CBW_FLAG_DATA_IN);
    }

    #[test_case]
    fn test_csw_parse_roundtrip() {
        let bytes = [b'U', b'S', b'B', b'S', 3, 0, 0, 0, 0, 0, 0, 0, 0];
        let csw = CommandStatusWrapper::from_bytes(&bytes).unwrap();
        assert_eq!(csw.tag, 3);
        assert_eq!(csw.status, CswStatus::CommandPassed);
    }

    #[test_case]
    fn test_csw_rejects_bad_signature() {
        let bytes = [0u8; CSW_LEN];
        assert!(CommandStatusWrapper::from_bytes(&bytes).is_err());
    }

    #[test_case]
    fn test_tag_generator_is_monotonic() {
        let mut gen = TagGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }

    #[test_case]
    fn test_read_10_command_block_is_big_endian() {
        let cb = cb_read_10(0x0102_0304, 2);
        assert_eq!(cb[0], scsi::READ_10);
        assert_eq!(&cb[2..6], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&cb[7..9], &[0x00, 0x02]);
    }
}
