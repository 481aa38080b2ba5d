pub mod creator;
pub mod errors;
pub mod execution;
pub mod operators;
pub mod types;

#[cfg(test)]
mod tests;

pub use errors::*;
pub use execution::*;
pub use types::*;
