//! Configuration parsing and types.
//!
//! - `types` - root config structure (`Config`, `UnitDefinition`, `ResourceKind`)
//! - `values` - free-form per-unit configuration (`UnitConfig`)
//! - `duration` - human-readable duration strings
//! - `parser` - YAML config discovery and parsing
//! - `validation` - structural config validation

mod duration;
mod parser;
mod types;
mod validation;
mod values;

pub use duration::*;
pub use parser::*;
pub use types::*;
pub use values::*;
