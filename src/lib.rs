pub mod audio;
pub mod config;
pub mod middle;
pub mod pipeline;
pub mod sequencer_api;
pub mod shared;
pub mod storage;
