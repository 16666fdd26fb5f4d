//! System services module
//!
//! Provides core system services including process management,
//! driver framework, and system daemons.

pub mod driver_framework;
pub mod init_system;
pub mod notification_ipc;
pub mod process_server;
pub mod shell;
pub mod shell_utils;

pub use driver_framework::DriverFramework;
pub use init_system::InitSystem;
pub use process_server::ProcessServer;
pub use shell::Shell;

/// Initialize all system services
pub fn init() {
    println!("[SERVICES] Initializing system services...");

    println!("[SERVICES] Initializing process server...");
    process_server::init();
    println!("[SERVICES] Process server initialized");

    println!("[SERVICES] Initializing driver framework...");
    driver_framework::init();
    println!("[SERVICES] Driver framework initialized");

    println!("[SERVICES] Initializing init system...");
    init_system::init();
    println!("[SERVICES] Init system initialized");

    println!("[SERVICES] Initializing thread management...");
    crate::thread_api::init();
    println!("[SERVICES] Thread management initialized");

    println!("[SERVICES] Initializing standard library...");
    crate::stdlib::init();
    println!("[SERVICES] Standard library initialized");

    println!("[SERVICES] Initializing shell...");
    shell::init();
    println!("[SERVICES] Shell initialized");

    println!("[SERVICES] System services initialized");

    // NOTE: Network initialization removed - was causing kernel hang
    // The network subsystem should be initialized lazily when needed
}
