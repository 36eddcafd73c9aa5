//! Account counter for capacity decisions
//!
//! [`AccountCounter`] tracks how many MasterUserRecords exist and how many
//! UserAccounts each member cluster hosts. The counts are volatile: they are
//! rebuilt with [`synchronize`] on startup and written back to the
//! ToolchainStatus with [`publish`].

#![deny(missing_docs)]

mod counter;
mod sync;

pub use counter::{AccountCounter, Counts};
pub use sync::{publish, synchronize, CountsSource, KubeCountsSource};
