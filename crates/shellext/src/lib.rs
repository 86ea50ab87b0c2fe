//! # shellext
//!
//! GNOME Shell extension installs from extensions.gnome.org.
//!
//! An install runs four steps, each reported in errors as a [`Step`]:
//!
//! 1. **Lookup**: search the index and pick the entry whose uuid matches
//! 2. **Resolve**: ask for the release matching the running shell's major version
//! 3. **Download**: fetch the archive into a private scratch directory
//! 4. **Install**: check `metadata.json`, run `gnome-extensions install`, enable
//!
//! The scratch directory is removed when the install returns.
//!
//! ## Example
//!
//! ```no_run
//! use shellext::{GnomeExtensionsCli, GnomeExtensionsIndex, Installer};
//!
//! let installer = Installer::new(
//!     Box::new(GnomeExtensionsIndex::new()),
//!     Box::new(GnomeExtensionsCli::new()),
//!     std::env::temp_dir(),
//! );
//! let report = installer
//!     .install("caffeine@patapon.info", "caffeine", true)
//!     .expect("install failed");
//! println!("installed version {:?}", report.version);
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod index;
pub mod install;
pub mod shell;
pub mod types;

pub use error::{Error, ErrorCategory, Result, Step};
pub use index::{ExtensionIndex, GnomeExtensionsIndex, MockIndex};
pub use install::{Installer, verify_archive};
pub use shell::{GnomeExtensionsCli, ShellTool};
pub use types::{ExtensionEntry, ExtensionRelease, ExtensionState, InstallReport, ShellVersion};
