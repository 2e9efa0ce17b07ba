//! Storage layout and settings files

pub mod layout;
pub mod settings;
