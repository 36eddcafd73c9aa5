//! Startup tasks run once before the controllers start

mod counter;
mod crds;

pub use counter::{run_counter_publisher, synchronize_counter};
pub use crds::{ensure_crds_installed, host_crds, print_crds};
