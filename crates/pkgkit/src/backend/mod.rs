//! Package-manager backends.
//!
//! Each backend knows one tool's command line and how to read its answers.
//! Commands run through the [`Exec`](crate::exec::Exec) the caller passes in.

pub mod dnf;
pub mod flatpak;

pub use dnf::DnfBackend;
pub use flatpak::FlatpakBackend;
