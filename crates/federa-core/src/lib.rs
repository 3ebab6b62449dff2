//! Federa Core - Identity model, configuration and capability traits for the
//! Google identity-federation connector

pub mod settings;
pub mod error;
pub mod identity;
pub mod traits;


pub use settings::*;
pub use error::*;
pub use identity::*;
pub use traits::*;
