mod builder;
mod core;
mod factory;

pub use builder::StateManagerBuilder;
pub use core::*;
pub use factory::UnitFactory;
