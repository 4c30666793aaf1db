//! Coordinates power and performance state across the independent CLI
//! tools found on ASUS laptops (asusctl, supergfxctl, ryzenadj,
//! nvidia-smi), presenting one consistent state model while handling
//! tool absence, unstable output formats, privilege escalation and
//! concurrent-instance coordination.

pub mod bridge;
pub mod cli;
pub mod debounce;
pub mod error;
pub mod output;
pub mod profile;
pub mod reconciler;
pub mod runner;
pub mod settings;
pub mod single_instance;
