pub mod actors;
pub mod config;
pub mod discovery;
pub mod error;
pub mod inventory;
pub mod probe;
pub mod registry;
pub mod template;
pub mod util;
