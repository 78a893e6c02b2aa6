//! the command line of the `inodefs` binary
mod cli_struct;
mod commands;
pub use cli_struct::*;
pub use commands::run;
