/// The main library module for the project.
///
/// This module re-exports all submodules, providing a central entry point for the library.
///
/// # Modules
/// * `board` - Hardware identification, capability, and power policy reporting.
/// * `http` - HTTP client functionality.
/// * `storage` - Non-volatile storage bring-up.
/// * `thread` - Threading utilities.
/// * `time` - Time-related utilities.
/// * `wifi` - Wi-Fi connectivity and management.
pub mod board;
pub mod http;
pub mod storage;
pub mod thread;
pub mod time;
pub mod wifi;
