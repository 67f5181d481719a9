pub mod endpoint;
pub mod frame;
pub mod reconnect;
pub mod state;
pub mod types;

pub use endpoint::*;
pub use frame::*;
pub use reconnect::*;
pub use state::*;
pub use types::*;
