pub mod about;
pub mod align;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gct;
#[cfg(feature = "gctx")]
pub mod gctx;
pub mod matrix;
pub mod matrix_io;
pub mod normalize;
pub mod persist;
pub mod pipeline;
pub mod split;
pub mod subset;
pub mod table;

pub use kheper_protocol as protocol;
