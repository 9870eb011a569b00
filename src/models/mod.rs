pub mod constants;
pub mod node;
pub mod restart;
