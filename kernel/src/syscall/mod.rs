//! System call interface
//!
//! Dispatches the POSIX-like core syscall surface: process control
//! (fork/execve/waitpid/exit/kill), memory (brk/mmap/munmap), and file I/O
//! (open/close/read/write).

#![allow(dead_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod filesystem;
pub mod memory;
pub mod process;
pub mod userspace;

pub use userspace::validate_user_ptr as validate_user_pointer;

/// Validate a user-space buffer of `len` bytes starting at `ptr`.
pub fn validate_user_buffer(ptr: usize, len: usize) -> Result<(), SyscallError> {
    userspace::validate_user_ptr(ptr, len)
}

/// Validate a user-space pointer to a `T`.
pub fn validate_user_ptr_typed<T>(ptr: usize) -> Result<(), SyscallError> {
    userspace::validate_user_ptr(ptr, core::mem::size_of::<T>())
}

/// System call numbers
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Read = 0,
    Write = 1,
    Open = 2,
    Close = 3,
    Brk = 12,
    Mmap = 9,
    Munmap = 11,
    Fork = 57,
    Execve = 59,
    Exit = 60,
    Waitpid = 61,
    Kill = 62,
}

/// System call result type
pub type SyscallResult = Result<usize, SyscallError>;

/// System call error codes
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall = -1,
    InvalidArgument = -2,
    PermissionDenied = -3,
    ResourceNotFound = -4,
    OutOfMemory = -5,
    WouldBlock = -6,
    Interrupted = -7,
    InvalidPointer = -8,
    InvalidState = -9,
    BadFileDescriptor = -10,
    ProcessNotFound = -11,
    IoError = -12,
    NotATerminal = -13,
}

impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Syscall::Read),
            1 => Ok(Syscall::Write),
            2 => Ok(Syscall::Open),
            3 => Ok(Syscall::Close),
            9 => Ok(Syscall::Mmap),
            11 => Ok(Syscall::Munmap),
            12 => Ok(Syscall::Brk),
            57 => Ok(Syscall::Fork),
            59 => Ok(Syscall::Execve),
            60 => Ok(Syscall::Exit),
            61 => Ok(Syscall::Waitpid),
            62 => Ok(Syscall::Kill),
            _ => Err(()),
        }
    }
}

/// System call handler entry point, invoked from the arch interrupt stub.
#[no_mangle]
pub extern "C" fn syscall_handler(
    syscall_num: usize,
    arg1: usize,
    arg2: usize,
    arg3: usize,
    arg4: usize,
    arg5: usize,
) -> isize {
    let result = match Syscall::try_from(syscall_num) {
        Ok(syscall) => handle_syscall(syscall, arg1, arg2, arg3, arg4, arg5),
        Err(_) => Err(SyscallError::InvalidSyscall),
    };

    match result {
        Ok(value) => value as isize,
        Err(error) => error as i32 as isize,
    }
}

/// Dispatch a decoded syscall to its handler.
fn handle_syscall(
    syscall: Syscall,
    arg1: usize,
    arg2: usize,
    arg3: usize,
    arg4: usize,
    arg5: usize,
) -> SyscallResult {
    match syscall {
        Syscall::Read => filesystem::sys_read(arg1, arg2, arg3),
        Syscall::Write => filesystem::sys_write(arg1, arg2, arg3),
        Syscall::Open => filesystem::sys_open(arg1, arg2, arg3),
        Syscall::Close => filesystem::sys_close(arg1),

        Syscall::Brk => memory::sys_brk(arg1),
        Syscall::Mmap => memory::sys_mmap(arg1, arg2, arg3, arg4, arg5),
        Syscall::Munmap => memory::sys_munmap(arg1, arg2),

        Syscall::Fork => process::sys_fork(),
        Syscall::Execve => process::sys_exec(arg1, arg2, arg3),
        Syscall::Exit => process::sys_exit(arg1),
        Syscall::Waitpid => process::sys_wait(arg1 as isize, arg2, arg3),
        Syscall::Kill => process::sys_kill(arg1, arg2),
    }
}
