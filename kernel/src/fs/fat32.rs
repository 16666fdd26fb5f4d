//! FAT32 filesystem driver
//!
//! Reads and writes FAT32 volumes (the on-disk layout described in
//! Microsoft's FAT specification): a BIOS Parameter Block, twin File
//! Allocation Tables, and a root directory that is itself a cluster chain.
//! Long file names are not supported; files are addressed by 8.3 short
//! names only.

use alloc::{format, string::String, sync::Arc, vec, vec::Vec};

use spin::RwLock;

use super::{blockdev::BlockDevice, DirEntry, Filesystem, Metadata, NodeType, Permissions, VfsNode};
use crate::error::{FsError, KernelError};

const BYTES_PER_SECTOR: usize = 512;
const DIR_ENTRY_SIZE: usize = 32;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_ARCHIVE: u8 = 0x20;
const FREE_ENTRY: u8 = 0x00;
const DELETED_ENTRY: u8 = 0xE5;
const FAT32_EOC: u32 = 0x0FFF_FFF8;
const FAT32_BAD: u32 = 0x0FFF_FFF7;
const CLUSTER_MASK: u32 = 0x0FFF_FFFF;

/// Lay down a fresh FAT32 volume on `dev`: boot sector, FSInfo sector,
/// two FAT copies, and an empty root directory in a single cluster.
pub fn format(dev: &super::blockdev::RamBlockDevice) -> Result<(), KernelError> {
    let total_sectors = dev.block_count() as u32;
    let sectors_per_cluster: u32 = if total_sectors >= 65536 { 8 } else { 1 };
    let reserved_sectors: u32 = 32;
    let num_fats: u32 = 2;

    // Conservative sizing: assume the FAT itself consumes negligible space
    // relative to the data region, then round the FAT size up to cover it.
    let approx_data_sectors = total_sectors.saturating_sub(reserved_sectors);
    let approx_clusters = approx_data_sectors / sectors_per_cluster.max(1);
    let sectors_per_fat = ((approx_clusters as u64 * 4).div_ceil(BYTES_PER_SECTOR as u64)) as u32 + 1;

    let data_start_sector = reserved_sectors + num_fats * sectors_per_fat;
    let total_clusters = (total_sectors.saturating_sub(data_start_sector)) / sectors_per_cluster.max(1);
    if total_clusters < 3 {
        return Err(FsError::FileTooLarge.into());
    }

    let mut boot = vec![0u8; BYTES_PER_SECTOR];
    boot[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    boot[3..11].copy_from_slice(b"CASTOROS");
    boot[11..13].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
    boot[13] = sectors_per_cluster as u8;
    boot[14..16].copy_from_slice(&(reserved_sectors as u16).to_le_bytes());
    boot[16] = num_fats as u8;
    // root_entry_count, total_sectors16, fat_size16 stay zero: this is FAT32.
    boot[21] = 0xF8; // media descriptor: fixed disk
    boot[24..26].copy_from_slice(&32u16.to_le_bytes());
    boot[26..28].copy_from_slice(&64u16.to_le_bytes());
    boot[32..36].copy_from_slice(&total_sectors.to_le_bytes());
    boot[36..40].copy_from_slice(&sectors_per_fat.to_le_bytes());
    boot[44..48].copy_from_slice(&2u32.to_le_bytes()); // root_cluster
    boot[48..50].copy_from_slice(&1u16.to_le_bytes()); // fs_info_sector
    boot[50..52].copy_from_slice(&6u16.to_le_bytes()); // backup_boot_sector
    boot[66] = 0x29; // boot signature
    boot[67..71].copy_from_slice(&0xC0FFEE42u32.to_le_bytes());
    boot[71..82].copy_from_slice(b"CASTOROS FS");
    boot[82..90].copy_from_slice(b"FAT32   ");
    boot[510] = 0x55;
    boot[511] = 0xAA;
    dev.write_blocks(0, &boot)?;
    dev.write_blocks(6, &boot)?; // backup boot sector

    let mut fsinfo = vec![0u8; BYTES_PER_SECTOR];
    fsinfo[0..4].copy_from_slice(&0x4161_5252u32.to_le_bytes());
    fsinfo[484..488].copy_from_slice(&0x6141_7272u32.to_le_bytes());
    fsinfo[488..492].copy_from_slice(&(total_clusters - 1).to_le_bytes());
    fsinfo[492..496].copy_from_slice(&3u32.to_le_bytes());
    fsinfo[508..512].copy_from_slice(&[0x00, 0x00, 0x55, 0xAA]);
    dev.write_blocks(1, &fsinfo)?;

    // FAT[0] and FAT[1] are reserved, carrying the media descriptor and an
    // end-of-chain marker. FAT[2] (the root directory's only cluster) is
    // marked end-of-chain since the root directory starts out empty.
    let mut fat_sector0 = vec![0u8; BYTES_PER_SECTOR];
    fat_sector0[0..4].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
    fat_sector0[4..8].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    fat_sector0[8..12].copy_from_slice(&FAT32_EOC.to_le_bytes());
    for fat_copy in 0..num_fats {
        let start = reserved_sectors + fat_copy * sectors_per_fat;
        dev.write_blocks(start as u64, &fat_sector0)?;
    }

    let root_dir_cluster = vec![0u8; sectors_per_cluster as usize * BYTES_PER_SECTOR];
    dev.write_blocks(data_start_sector as u64, &root_dir_cluster)?;

    Ok(())
}

/// A mounted FAT32 volume.
pub struct Fat32Volume {
    device: Arc<dyn BlockDevice>,
    sectors_per_cluster: u32,
    data_start_sector: u64,
    root_cluster: u32,
    fat: RwLock<FatTable>,
}

struct FatTable {
    entries: Vec<u32>,
    fat_start_sector: u64,
    num_fats: u32,
    sectors_per_fat: u32,
}

impl FatTable {
    fn get(&self, cluster: u32) -> u32 {
        self.entries[cluster as usize] & CLUSTER_MASK
    }

    fn is_eoc(value: u32) -> bool {
        (value & CLUSTER_MASK) >= FAT32_EOC
    }

    /// Find a free cluster and mark it as the new end of a chain.
    fn alloc_cluster(&mut self) -> Option<u32> {
        let free = (2..self.entries.len() as u32).find(|&c| self.entries[c as usize] & CLUSTER_MASK == 0)?;
        self.entries[free as usize] = FAT32_EOC;
        Some(free)
    }

    fn link(&mut self, from: u32, to: u32) {
        self.entries[from as usize] = to;
    }

    /// Persist every FAT copy's sector containing `cluster`'s entry.
    fn flush_entry(&self, device: &Arc<dyn BlockDevice>, cluster: u32) -> Result<(), KernelError> {
        let entries_per_sector = BYTES_PER_SECTOR / 4;
        let sector_in_fat = cluster as usize / entries_per_sector;
        let base_cluster = sector_in_fat * entries_per_sector;

        let mut sector = vec![0u8; BYTES_PER_SECTOR];
        for fat_copy in 0..self.num_fats {
            let abs_sector =
                self.fat_start_sector + fat_copy as u64 * self.sectors_per_fat as u64 + sector_in_fat as u64;
            device.read_blocks(abs_sector, &mut sector)?;
            for i in 0..entries_per_sector {
                let c = base_cluster + i;
                if c < self.entries.len() {
                    sector[i * 4..i * 4 + 4].copy_from_slice(&self.entries[c].to_le_bytes());
                }
            }
            device.write_blocks(abs_sector, &sector)?;
        }
        Ok(())
    }
}

impl Fat32Volume {
    /// Mount a FAT32 volume from a block device, parsing its BPB and FAT.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Arc<Self>, KernelError> {
        let mut boot = vec![0u8; BYTES_PER_SECTOR];
        device.read_blocks(0, &mut boot)?;
        if boot[510] != 0x55 || boot[511] != 0xAA {
            return Err(FsError::IoError.into());
        }
        if &boot[82..87] != b"FAT32" {
            return Err(FsError::IoError.into());
        }

        let bytes_per_sector = u16::from_le_bytes([boot[11], boot[12]]) as usize;
        if bytes_per_sector != BYTES_PER_SECTOR {
            return Err(FsError::NotSupported.into());
        }
        let sectors_per_cluster = boot[13] as u32;
        let reserved_sectors = u16::from_le_bytes([boot[14], boot[15]]) as u32;
        let num_fats = boot[16] as u32;
        let sectors_per_fat = u32::from_le_bytes([boot[36], boot[37], boot[38], boot[39]]);
        let root_cluster = u32::from_le_bytes([boot[44], boot[45], boot[46], boot[47]]);

        let fat_start_sector = reserved_sectors as u64;
        let data_start_sector = fat_start_sector + num_fats as u64 * sectors_per_fat as u64;

        let fat_bytes = sectors_per_fat as usize * BYTES_PER_SECTOR;
        let mut raw_fat = vec![0u8; fat_bytes];
        device.read_blocks(fat_start_sector, &mut raw_fat)?;
        let entries: Vec<u32> = raw_fat
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Arc::new(Self {
            device,
            sectors_per_cluster,
            data_start_sector,
            root_cluster,
            fat: RwLock::new(FatTable {
                entries,
                fat_start_sector,
                num_fats,
                sectors_per_fat,
            }),
        }))
    }

    fn bytes_per_cluster(&self) -> usize {
        self.sectors_per_cluster as usize * BYTES_PER_SECTOR
    }

    fn cluster_sector(&self, cluster: u32) -> u64 {
        self.data_start_sector + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    fn read_cluster(&self, cluster: u32) -> Result<Vec<u8>, KernelError> {
        let mut buf = vec![0u8; self.bytes_per_cluster()];
        self.device.read_blocks(self.cluster_sector(cluster), &mut buf)?;
        Ok(buf)
    }

    fn write_cluster(&self, cluster: u32, data: &[u8]) -> Result<(), KernelError> {
        self.device.write_blocks(self.cluster_sector(cluster), data)
    }

    /// Number of unallocated clusters, for FSInfo-style reporting.
    pub fn free_cluster_count(&self) -> u32 {
        let fat = self.fat.read();
        fat.entries[2..].iter().filter(|&&e| e & CLUSTER_MASK == 0).count() as u32
    }

    /// The root directory node.
    pub fn root_node(self: &Arc<Self>) -> Arc<Fat32Node> {
        Arc::new(Fat32Node {
            volume: self.clone(),
            kind: RwLock::new(NodeKind::Directory { first_cluster: self.root_cluster }),
            entry_location: RwLock::new(None),
            size: RwLock::new(0),
        })
    }

    /// Read the full chain of clusters starting at `first_cluster`.
    fn read_chain(&self, first_cluster: u32) -> Result<Vec<u8>, KernelError> {
        let mut data = Vec::new();
        let mut cluster = first_cluster;
        if cluster == 0 {
            return Ok(data);
        }
        loop {
            data.extend_from_slice(&self.read_cluster(cluster)?);
            let next = self.fat.read().get(cluster);
            if FatTable::is_eoc(next) || next == 0 {
                break;
            }
            cluster = next;
        }
        Ok(data)
    }

    fn parse_directory(&self, first_cluster: u32) -> Result<Vec<(usize, RawDirEntry)>, KernelError> {
        let data = self.read_chain(first_cluster)?;
        let mut out = Vec::new();
        for (i, chunk) in data.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
            if chunk[0] == FREE_ENTRY {
                break;
            }
            if chunk[0] == DELETED_ENTRY {
                continue;
            }
            out.push((i, RawDirEntry::parse(chunk)));
        }
        Ok(out)
    }
}

struct RawDirEntry {
    name: String,
    attr: u8,
    cluster: u32,
    size: u32,
}

impl RawDirEntry {
    fn parse(chunk: &[u8]) -> Self {
        let raw_name = &chunk[0..8];
        let raw_ext = &chunk[8..11];
        let name_part = core::str::from_utf8(raw_name).unwrap_or("").trim_end();
        let ext_part = core::str::from_utf8(raw_ext).unwrap_or("").trim_end();
        let name = if ext_part.is_empty() {
            String::from(name_part)
        } else {
            format!("{}.{}", name_part, ext_part)
        };
        let attr = chunk[11];
        let cluster_hi = u16::from_le_bytes([chunk[20], chunk[21]]) as u32;
        let cluster_lo = u16::from_le_bytes([chunk[26], chunk[27]]) as u32;
        let size = u32::from_le_bytes([chunk[28], chunk[29], chunk[30], chunk[31]]);
        Self { name, attr, cluster: (cluster_hi << 16) | cluster_lo, size }
    }

    fn encode(name: &str, attr: u8, cluster: u32, size: u32) -> [u8; DIR_ENTRY_SIZE] {
        let mut entry = [0u8; DIR_ENTRY_SIZE];
        let (base, ext) = match name.split_once('.') {
            Some((b, e)) => (b, e),
            None => (name, ""),
        };
        for (i, b) in entry[0..8].iter_mut().enumerate() {
            *b = base.as_bytes().get(i).copied().unwrap_or(b' ').to_ascii_uppercase();
        }
        for (i, b) in entry[8..11].iter_mut().enumerate() {
            *b = ext.as_bytes().get(i).copied().unwrap_or(b' ').to_ascii_uppercase();
        }
        entry[11] = attr;
        entry[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
        entry[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
        entry[28..32].copy_from_slice(&size.to_le_bytes());
        entry
    }
}

fn to_short_name(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    match upper.split_once('.') {
        Some((base, ext)) => format!("{:.8}.{:.3}", base, ext),
        None => format!("{:.8}", upper),
    }
}

enum NodeKind {
    File { first_cluster: u32 },
    Directory { first_cluster: u32 },
}

/// A file or directory inside a mounted FAT32 volume.
pub struct Fat32Node {
    volume: Arc<Fat32Volume>,
    kind: RwLock<NodeKind>,
    /// (directory's first cluster, entry index) so writes can patch the
    /// owning directory entry's size/cluster fields back to disk.
    entry_location: RwLock<Option<(u32, usize)>>,
    size: RwLock<u32>,
}

impl Fat32Node {
    fn first_cluster(&self) -> u32 {
        match &*self.kind.read() {
            NodeKind::File { first_cluster } | NodeKind::Directory { first_cluster } => *first_cluster,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(&*self.kind.read(), NodeKind::Directory { .. })
    }

    /// Create a new regular file as a child of this directory node.
    pub fn create_file(&self, name: &str) -> Result<Arc<Fat32Node>, KernelError> {
        self.create_entry(name, ATTR_ARCHIVE)
    }

    /// Create a new directory entry (file or subdirectory) as a child of
    /// this directory node.
    fn create_entry(&self, name: &str, attr: u8) -> Result<Arc<Fat32Node>, KernelError> {
        if !self.is_dir() {
            return Err(FsError::NotADirectory.into());
        }
        let dir_cluster = self.first_cluster();
        let short_name = to_short_name(name);

        let entries = self.volume.parse_directory(dir_cluster)?;
        if entries.iter().any(|(_, e)| e.name == short_name) {
            return Err(FsError::AlreadyExists.into());
        }
        let entry_index = entries.len();

        let raw = RawDirEntry::encode(&short_name, attr, 0, 0);
        self.write_entry(dir_cluster, entry_index, &raw)?;

        let kind = if attr & ATTR_DIRECTORY != 0 {
            NodeKind::Directory { first_cluster: 0 }
        } else {
            NodeKind::File { first_cluster: 0 }
        };
        Ok(Arc::new(Fat32Node {
            volume: self.volume.clone(),
            kind: RwLock::new(kind),
            entry_location: RwLock::new(Some((dir_cluster, entry_index))),
            size: RwLock::new(0),
        }))
    }

    /// Write one 32-byte directory entry at `index` within `dir_cluster`'s
    /// chain, extending the chain with a freshly allocated cluster if the
    /// index falls past its current length.
    fn write_entry(&self, dir_cluster: u32, index: usize, raw: &[u8; DIR_ENTRY_SIZE]) -> Result<(), KernelError> {
        let entries_per_cluster = self.volume.bytes_per_cluster() / DIR_ENTRY_SIZE;
        let mut cluster = dir_cluster;
        let mut remaining = index;
        while remaining >= entries_per_cluster {
            let next = self.volume.fat.read().get(cluster);
            cluster = if FatTable::is_eoc(next) || next == 0 {
                let new_cluster = {
                    let mut fat = self.volume.fat.write();
                    let c = fat.alloc_cluster().ok_or(FsError::FileTooLarge)?;
                    fat.link(cluster, c);
                    c
                };
                self.volume.fat.read().flush_entry(&self.volume.device, cluster)?;
                self.volume.fat.read().flush_entry(&self.volume.device, new_cluster)?;
                self.volume.write_cluster(new_cluster, &vec![0u8; self.volume.bytes_per_cluster()])?;
                new_cluster
            } else {
                next
            };
            remaining -= entries_per_cluster;
        }

        let mut buf = self.volume.read_cluster(cluster)?;
        let offset = remaining * DIR_ENTRY_SIZE;
        buf[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(raw);
        self.volume.write_cluster(cluster, &buf)
    }

    fn ensure_first_cluster(&self) -> Result<u32, KernelError> {
        let existing = self.first_cluster();
        if existing != 0 {
            return Ok(existing);
        }
        let new_cluster = {
            let mut fat = self.volume.fat.write();
            fat.alloc_cluster().ok_or(FsError::FileTooLarge)?
        };
        self.volume.fat.read().flush_entry(&self.volume.device, new_cluster)?;
        self.volume.write_cluster(new_cluster, &vec![0u8; self.volume.bytes_per_cluster()])?;

        *self.kind.write() = NodeKind::File { first_cluster: new_cluster };
        self.patch_owning_entry(new_cluster, *self.size.read())?;
        Ok(new_cluster)
    }

    fn patch_owning_entry(&self, cluster: u32, size: u32) -> Result<(), KernelError> {
        if let Some((dir_cluster, index)) = *self.entry_location.read() {
            let entries = self.volume.parse_directory(dir_cluster)?;
            let name = entries.get(index).map(|(_, e)| e.name.clone()).unwrap_or_default();
            let attr = if self.is_dir() { ATTR_DIRECTORY } else { ATTR_ARCHIVE };
            let raw = RawDirEntry::encode(&name, attr, cluster, size);
            self.write_entry(dir_cluster, index, &raw)?;
        }
        Ok(())
    }
}

impl VfsNode for Fat32Node {
    fn node_type(&self) -> NodeType {
        if self.is_dir() { NodeType::Directory } else { NodeType::File }
    }

    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<usize, KernelError> {
        if self.is_dir() {
            return Err(FsError::IsADirectory.into());
        }
        let first = self.first_cluster();
        if first == 0 {
            return Ok(0);
        }
        let data = self.volume.read_chain(first)?;
        let size = *self.size.read() as usize;
        let limit = core::cmp::min(data.len(), size);
        if offset >= limit {
            return Ok(0);
        }
        let n = core::cmp::min(buffer.len(), limit - offset);
        buffer[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<usize, KernelError> {
        if self.is_dir() {
            return Err(FsError::IsADirectory.into());
        }
        let first = self.ensure_first_cluster()?;
        let mut chain = self.volume.read_chain(first)?;

        let needed = offset + data.len();
        let bytes_per_cluster = self.volume.bytes_per_cluster();
        while chain.len() < needed {
            let last_cluster = {
                let mut cluster = first;
                loop {
                    let next = self.volume.fat.read().get(cluster);
                    if FatTable::is_eoc(next) || next == 0 {
                        break cluster;
                    }
                    cluster = next;
                }
            };
            let new_cluster = {
                let mut fat = self.volume.fat.write();
                let c = fat.alloc_cluster().ok_or(FsError::FileTooLarge)?;
                fat.link(last_cluster, c);
                c
            };
            self.volume.fat.read().flush_entry(&self.volume.device, last_cluster)?;
            self.volume.fat.read().flush_entry(&self.volume.device, new_cluster)?;
            chain.extend(vec![0u8; bytes_per_cluster]);
        }

        chain[offset..offset + data.len()].copy_from_slice(data);

        let mut cluster = first;
        for block in chain.chunks(bytes_per_cluster) {
            self.volume.write_cluster(cluster, block)?;
            let next = self.volume.fat.read().get(cluster);
            if FatTable::is_eoc(next) || next == 0 {
                break;
            }
            cluster = next;
        }

        let new_size = core::cmp::max(*self.size.read() as usize, needed) as u32;
        *self.size.write() = new_size;
        self.patch_owning_entry(first, new_size)?;
        Ok(data.len())
    }

    fn metadata(&self) -> Result<Metadata, KernelError> {
        Ok(Metadata {
            node_type: self.node_type(),
            size: *self.size.read() as usize,
            permissions: Permissions::default(),
            uid: 0,
            gid: 0,
            created: 0,
            modified: 0,
            accessed: 0,
        })
    }

    fn readdir(&self) -> Result<Vec<DirEntry>, KernelError> {
        if !self.is_dir() {
            return Err(FsError::NotADirectory.into());
        }
        let entries = self.volume.parse_directory(self.first_cluster())?;
        Ok(entries
            .into_iter()
            .map(|(i, e)| DirEntry {
                name: e.name,
                node_type: if e.attr & ATTR_DIRECTORY != 0 { NodeType::Directory } else { NodeType::File },
                inode: i as u64,
            })
            .collect())
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn VfsNode>, KernelError> {
        if !self.is_dir() {
            return Err(FsError::NotADirectory.into());
        }
        let short_name = to_short_name(name);
        let dir_cluster = self.first_cluster();
        let entries = self.volume.parse_directory(dir_cluster)?;
        let (index, entry) = entries
            .into_iter()
            .find(|(_, e)| e.name == short_name)
            .ok_or(FsError::NotFound)?;

        let kind = if entry.attr & ATTR_DIRECTORY != 0 {
            NodeKind::Directory { first_cluster: entry.cluster }
        } else {
            NodeKind::File { first_cluster: entry.cluster }
        };

        Ok(Arc::new(Fat32Node {
            volume: self.volume.clone(),
            kind: RwLock::new(kind),
            entry_location: RwLock::new(Some((dir_cluster, index))),
            size: RwLock::new(entry.size),
        }))
    }

    fn create(&self, name: &str, _permissions: Permissions) -> Result<Arc<dyn VfsNode>, KernelError> {
        let node: Arc<Fat32Node> = self.create_entry(name, ATTR_ARCHIVE)?;
        Ok(node)
    }

    fn mkdir(&self, name: &str, _permissions: Permissions) -> Result<Arc<dyn VfsNode>, KernelError> {
        let node: Arc<Fat32Node> = self.create_entry(name, ATTR_DIRECTORY)?;
        Ok(node)
    }

    fn unlink(&self, name: &str) -> Result<(), KernelError> {
        let dir_cluster = self.first_cluster();
        let short_name = to_short_name(name);
        let entries = self.volume.parse_directory(dir_cluster)?;
        let (index, _) = entries
            .into_iter()
            .find(|(_, e)| e.name == short_name)
            .ok_or(FsError::NotFound)?;
        let mut tombstone = [0u8; DIR_ENTRY_SIZE];
        tombstone[0] = DELETED_ENTRY;
        self.write_entry(dir_cluster, index, &tombstone)
    }

    fn truncate(&self, size: usize) -> Result<(), KernelError> {
        if self.is_dir() {
            return Err(FsError::IsADirectory.into());
        }
        *self.size.write() = size as u32;
        let first = self.first_cluster();
        if first != 0 {
            self.patch_owning_entry(first, size as u32)?;
        }
        Ok(())
    }
}

/// `Filesystem` adapter so a mounted volume can be registered with the VFS
/// alongside ramfs/devfs/procfs.
pub struct Fat32Filesystem {
    volume: Arc<Fat32Volume>,
    readonly: bool,
}

impl Fat32Filesystem {
    pub fn new(volume: Arc<Fat32Volume>, readonly: bool) -> Self {
        Self { volume, readonly }
    }
}

impl Filesystem for Fat32Filesystem {
    fn root(&self) -> Arc<dyn VfsNode> {
        self.volume.root_node()
    }

    fn name(&self) -> &str {
        "fat32"
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn sync(&self) -> Result<(), KernelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::fs::blockdev::RamBlockDevice;

    #[test_case]
    fn test_mount_freshly_formatted_volume() {
        let dev: Arc<dyn BlockDevice> = Arc::new(RamBlockDevice::formatted_fat32("fat_test0", 4 * 1024 * 1024));
        let vol = Fat32Volume::mount(dev).expect("mount should succeed on a freshly formatted image");
        assert!(vol.free_cluster_count() > 0);
    }

    #[test_case]
    fn test_create_write_read_round_trip() {
        let dev: Arc<dyn BlockDevice> = Arc::new(RamBlockDevice::formatted_fat32("fat_test1", 4 * 1024 * 1024));
        let vol = Fat32Volume::mount(dev).expect("mount");
        let root = vol.root_node();
        let file = root.create_file("HELLO.TXT").expect("create");
        file.write(0, b"hello world").expect("write");
        let mut buf = [0u8; 11];
        let n = file.read(0, &mut buf).expect("read");
        assert_eq!(&buf[..n], b"hello world");
    }

    #[test_case]
    fn test_readdir_lists_created_entries() {
        let dev: Arc<dyn BlockDevice> = Arc::new(RamBlockDevice::formatted_fat32("fat_test2", 4 * 1024 * 1024));
        let vol = Fat32Volume::mount(dev).expect("mount");
        let root = vol.root_node();
        root.create_file("A.TXT").expect("create a");
        root.create_file("B.TXT").expect("create b");
        let names: Vec<String> = root.readdir().expect("readdir").into_iter().map(|e| e.name).collect();
        assert!(names.contains(&String::from("A.TXT")));
        assert!(names.contains(&String::from("B.TXT")));
    }
}
