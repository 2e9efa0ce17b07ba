//! Server bootstrap

pub mod options;
pub mod run;
