pub mod common;
pub mod restaurants;
pub mod system;

pub use common::*;
pub use restaurants::*;
pub use system::*;
