//! Boot-time smoke tests for the FAT32 filesystem driver.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use castor_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting FAT32 boot tests...");

    test_mount_ramdisk_image();
    test_round_trip_file();

    serial_println!("All FAT32 boot tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_mount_ramdisk_image() {
    use castor_kernel::fs::blockdev::{register_block_device, RamBlockDevice};
    use castor_kernel::fs::fat32;
    use alloc::sync::Arc;

    extern crate alloc;

    let dev = Arc::new(RamBlockDevice::formatted_fat32("fat0", 4 * 1024 * 1024));
    register_block_device(dev.clone());
    let vol = fat32::Fat32Volume::mount(dev).expect("mount should succeed on a freshly formatted image");
    serial_println!("mounted fat32 volume, {} clusters free", vol.free_cluster_count());
}

fn test_round_trip_file() {
    use castor_kernel::fs::blockdev::RamBlockDevice;
    use castor_kernel::fs::fat32;
    use alloc::sync::Arc;

    extern crate alloc;

    let dev = Arc::new(RamBlockDevice::formatted_fat32("fat1", 4 * 1024 * 1024));
    let vol = fat32::Fat32Volume::mount(dev).expect("mount");
    let root = vol.root_node();
    let file = root.create_file("HELLO.TXT").expect("create");
    file.write(0, b"hello world").expect("write");
    let mut buf = [0u8; 11];
    let n = file.read(0, &mut buf).expect("read");
    assert_eq!(&buf[..n], b"hello world");
}
