pub mod periodic;
pub mod signal;
