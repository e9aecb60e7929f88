//! DataWedge client built on the scanlink correlation engine.
//!
//! DataWedge is driven entirely through broadcast intents: commands go out on
//! one action, results come back on others, with no delivery guarantee and an
//! identifier echo that older releases skip. [`DataWedge`] turns that into
//! ordinary async calls with deadlines.
//!
//! ```text
//! DataWedge (facade) ──issue/send──▶ HostHandle ──▶ Correlator ──▶ Channel
//!        ▲                                              │
//!        └────────── outcome ◀── results/scans ◀────────┘
//! ```
//!
//! [`sim::SimulatedDataWedge`] answers like the real service and is what the
//! tests and the CLI's offline mode run against.

pub mod api;
pub mod command;
pub mod error;
pub mod extract;
pub mod plugin;
pub mod profile;
pub mod results;
pub mod scan;
pub mod sim;

pub use error::{DataWedgeError, Result};
pub use plugin::{ConfigureOptions, DataWedge, InitializeOptions, InitializeResult};
pub use profile::ProfileConfig;
pub use results::{
    AvailabilityResult, ConfigureResult, ReadyResult, ScannerEntry, ScannerStatusResult,
    VersionInfo,
};
pub use scan::{DataWedgeResultEvent, ResultSubscription, ScanEvent, ScanSubscription};
pub use sim::SimulatedDataWedge;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
