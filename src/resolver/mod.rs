//! Maps geographic requests onto the remote service: grid indices, URLs and names.

pub mod error;
pub mod grid;
pub mod remote;
