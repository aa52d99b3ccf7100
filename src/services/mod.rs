//! The storage core: path handling, backend drivers, folder emulation,
//! chunk assembly, and the multiplexing context that ties them together.

pub mod chunks;
pub mod context;
pub mod driver;
pub mod folders;
pub mod fs_driver;
pub mod memory_driver;
pub mod paths;
