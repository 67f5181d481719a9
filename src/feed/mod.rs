pub mod manager;

pub use crate::core::*;
pub use manager::*;
