pub mod commands;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod playback;
pub mod preview;
pub mod state;
pub mod system;
pub mod track;
pub mod traits;
pub mod util;
