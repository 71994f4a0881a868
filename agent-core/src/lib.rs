pub mod prelude;
pub mod strng;

pub use strng::{Hostname, Strng};
