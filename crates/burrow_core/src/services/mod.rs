pub mod logging;
pub mod ssh_tunnel;

pub use logging::*;
pub use ssh_tunnel::*;
