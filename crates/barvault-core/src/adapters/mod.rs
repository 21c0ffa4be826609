//! Provider adapters.

pub mod synthetic;

pub use synthetic::SyntheticProvider;
