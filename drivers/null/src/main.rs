//! Null device driver for CastorOS
//!
//! This driver implements /dev/null functionality as a user-space driver.

#![no_std]
#![no_main]

extern crate libveridian;
use libveridian::{println, sys};

extern crate veridian_driver_common;
use veridian_driver_common::{
    CharDriver, Driver, DriverError, DriverInfo, DriverState,
};

/// Null device driver structure
struct NullDriver {
    info: DriverInfo,
    state: DriverState,
}

impl NullDriver {
    /// Create a new null driver
    fn new() -> Self {
        Self {
            info: DriverInfo {
                name: "null",
                version: (1, 0, 0),
                author: "CastorOS Team",
                description: "Null device driver (/dev/null)",
                device_ids: &[],
                required_caps: veridian_driver_common::CAP_DEVICE_ACCESS,
            },
            state: DriverState::Initializing,
        }
    }
}

impl Driver for NullDriver {
    fn info(&self) -> &DriverInfo {
        &self.info
    }
    
    fn init(&mut self) -> Result<(), DriverError> {
        println!("[NULL] Initializing null device driver");
        self.state = DriverState::Ready;
        Ok(())
    }
    
    fn probe(&self) -> Result<bool, DriverError> {
        // Null device is always present
        Ok(true)
    }
    
    fn start(&mut self) -> Result<(), DriverError> {
        println!("[NULL] Starting null device driver");
        self.state = DriverState::Ready;
        Ok(())
    }
    
    fn stop(&mut self) -> Result<(), DriverError> {
        println!("[NULL] Stopping null device driver");
        self.state = DriverState::Stopped;
        Ok(())
    }
    
    fn state(&self) -> DriverState {
        self.state
    }
    
    fn handle_interrupt(&mut self, _irq: u32) -> Result<(), DriverError> {
        // Null device doesn't generate interrupts
        Err(DriverError::NotSupported)
    }
}

impl CharDriver for NullDriver {
    fn read(&mut self, _buffer: &mut [u8]) -> Result<usize, DriverError> {
        // /dev/null always returns EOF (0 bytes)
        Ok(0)
    }
    
    fn write(&mut self, data: &[u8]) -> Result<usize, DriverError> {
        // /dev/null discards all data
        Ok(data.len())
    }
    
    fn poll(&self) -> Result<bool, DriverError> {
        // Never has data available
        Ok(false)
    }
}

/// Driver message loop
fn driver_loop(driver: &mut NullDriver) {
    loop {
        // Wait for IPC messages from kernel
        let mut msg_buffer = [0u8; 256];
        
        // TODO: Replace with actual IPC endpoint when available
        let endpoint = 0x1000; // Placeholder endpoint
        
        match sys::ipc_receive(endpoint, &mut msg_buffer) {
            Ok(size) => {
                if size > 0 {
                    // Parse message type
                    let msg_type = msg_buffer[0];
                    
                    match msg_type {
                        1 => { // Read request
                            let mut response = [0u8; 64];
                            let bytes_read = driver.read(&mut response).unwrap_or(0);
                            // Send response back
                            sys::ipc_reply(endpoint, &response[..bytes_read]).ok();
                        }
                        2 => { // Write request
                            let data = &msg_buffer[1..size];
                            let bytes_written = driver.write(data).unwrap_or(0);
                            // Send acknowledgment
                            let response = [bytes_written as u8];
                            sys::ipc_reply(endpoint, &response).ok();
                        }
                        3 => { // Poll request
                            let available = driver.poll().unwrap_or(false);
                            let response = [available as u8];
                            sys::ipc_reply(endpoint, &response).ok();
                        }
                        4 => { // Stop request
                            driver.stop().ok();
                            break;
                        }
                        _ => {
                            println!("[NULL] Unknown message type: {}", msg_type);
                        }
                    }
                }
            }
            Err(_) => {
                // Error receiving message, wait and retry
                sys::yield_cpu();
            }
        }
    }
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    println!("[NULL] Null device driver starting...");
    
    // Create driver instance
    let mut driver = NullDriver::new();
    
    // Initialize driver
    if let Err(e) = driver.init() {
        println!("[NULL] Failed to initialize: {:?}", e);
        sys::exit(1);
    }
    
    // Start driver
    if let Err(e) = driver.start() {
        println!("[NULL] Failed to start: {:?}", e);
        sys::exit(1);
    }
    
    println!("[NULL] Driver ready, entering message loop");
    
    // Enter driver message loop
    driver_loop(&mut driver);
    
    println!("[NULL] Driver exiting");
    sys::exit(0);
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    println!("[NULL] Driver panic!");
    sys::exit(255);
}