//! Block Device Abstraction
//!
//! Provides a common interface for block-level storage devices.

use alloc::{collections::BTreeMap, string::String, sync::Arc, vec::Vec};

use spin::RwLock;

use crate::error::KernelError;

/// Global registry of block devices, keyed by device name.
///
/// USB mass storage and the FAT32 driver both mount by looking a device
/// up here rather than threading a reference through the VFS layer.
static BLOCK_DEVICES: RwLock<BTreeMap<String, Arc<dyn BlockDevice>>> = RwLock::new(BTreeMap::new());

/// Register a block device under its own name, making it mountable.
pub fn register_block_device(device: Arc<dyn BlockDevice>) {
    BLOCK_DEVICES.write().insert(String::from(device.name()), device);
}

/// Remove a previously registered block device.
pub fn unregister_block_device(name: &str) -> Option<Arc<dyn BlockDevice>> {
    BLOCK_DEVICES.write().remove(name)
}

/// Look up a registered block device by name.
pub fn get_block_device(name: &str) -> Option<Arc<dyn BlockDevice>> {
    BLOCK_DEVICES.read().get(name).cloned()
}

/// Block device trait
pub trait BlockDevice: Send + Sync {
    /// Get device name
    fn name(&self) -> &str;

    /// Get block size in bytes
    fn block_size(&self) -> usize;

    /// Get total number of blocks
    fn block_count(&self) -> u64;

    /// Read blocks from device
    fn read_blocks(&self, start_block: u64, buffer: &mut [u8]) -> Result<(), KernelError>;

    /// Write blocks to device
    fn write_blocks(&self, start_block: u64, buffer: &[u8]) -> Result<(), KernelError>;

    /// Flush any cached writes
    fn flush(&self) -> Result<(), KernelError> {
        Ok(()) // Default: no-op
    }
}

/// RAM-backed block device (for testing/ramdisk)
pub struct RamBlockDevice {
    name: alloc::string::String,
    block_size: usize,
    data: RwLock<Vec<u8>>,
}

impl RamBlockDevice {
    /// Create a new RAM block device
    pub fn new(name: alloc::string::String, block_size: usize, block_count: u64) -> Self {
        let size = block_size * block_count as usize;
        Self {
            name,
            block_size,
            data: RwLock::new(alloc::vec![0u8; size]),
        }
    }

    /// Get total size in bytes
    pub fn size(&self) -> usize {
        self.data.read().len()
    }

    /// Build a RAM block device already formatted as a fresh FAT32 volume.
    ///
    /// Lays down a minimal but spec-conformant boot sector, FSInfo sector,
    /// and FAT tables, with an empty root directory at cluster 2.
    pub fn formatted_fat32(name: &str, size_bytes: usize) -> Self {
        let dev = Self::new(String::from(name), 512, (size_bytes / 512) as u64);
        super::fat32::format(&dev).expect("in-memory FAT32 format should never fail");
        dev
    }
}

impl BlockDevice for RamBlockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        (self.data.read().len() / self.block_size) as u64
    }

    fn read_blocks(&self, start_block: u64, buffer: &mut [u8]) -> Result<(), KernelError> {
        let data = self.data.read();
        let start_byte = start_block as usize * self.block_size;
        let end_byte = start_byte + buffer.len();

        if end_byte > data.len() {
            return Err(KernelError::InvalidArgument {
                name: "block_range",
                value: "out_of_bounds",
            });
        }

        buffer.copy_from_slice(&data[start_byte..end_byte]);
        Ok(())
    }

    fn write_blocks(&self, start_block: u64, buffer: &[u8]) -> Result<(), KernelError> {
        let mut data = self.data.write();
        let start_byte = start_block as usize * self.block_size;
        let end_byte = start_byte + buffer.len();

        if end_byte > data.len() {
            return Err(KernelError::InvalidArgument {
                name: "block_range",
                value: "out_of_bounds",
            });
        }

        data[start_byte..end_byte].copy_from_slice(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use super::*;

    #[test_case]
    fn test_ram_block_device() {
        let mut dev = RamBlockDevice::new(String::from("test"), 512, 100);

        assert_eq!(dev.block_size(), 512);
        assert_eq!(dev.block_count(), 100);

        // Write some data
        let write_data = [0x42u8; 512];
        dev.write_blocks(0, &write_data).unwrap();

        // Read it back
        let mut read_data = [0u8; 512];
        dev.read_blocks(0, &mut read_data).unwrap();

        assert_eq!(read_data, write_data);
    }
}
