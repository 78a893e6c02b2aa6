pub mod digest;
pub mod fs_size_calculator;
pub mod traits;
