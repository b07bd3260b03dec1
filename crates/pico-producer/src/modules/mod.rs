//! Built-in analysis modules.

pub mod mutau;
pub mod skim;

pub use mutau::MuTauModule;
pub use skim::SkimModule;
