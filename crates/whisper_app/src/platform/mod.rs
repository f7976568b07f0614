pub mod agent;
pub(crate) mod effects;
pub mod logging;
pub mod settings;
