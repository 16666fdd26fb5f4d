//! Boot-time smoke tests for the USB Mass Storage (Bulk-Only Transport) driver.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use castor_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting USB MSC boot tests...");

    test_cbw_csw_framing();
    test_tag_monotonicity();

    serial_println!("All USB MSC boot tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_cbw_csw_framing() {
    use castor_kernel::drivers::usb::msc::{CommandBlockWrapper, CommandStatusWrapper};

    let cbw = CommandBlockWrapper::new(1, 512, false, 0, &[0x00; 6]);
    let bytes = cbw.to_bytes();
    assert_eq!(&bytes[0..4], b"USBC");

    let csw_bytes = [b'U', b'S', b'B', b'S', 1, 0, 0, 0, 0, 0, 0, 0, 0];
    let csw = CommandStatusWrapper::from_bytes(&csw_bytes).expect("parse csw");
    assert_eq!(csw.tag, 1);
}

fn test_tag_monotonicity() {
    use castor_kernel::drivers::usb::msc::TagGenerator;

    let mut gen = TagGenerator::new();
    let a = gen.next();
    let b = gen.next();
    assert!(b > a);
}
