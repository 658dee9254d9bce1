pub mod common;
pub mod dband;
pub mod sites;
