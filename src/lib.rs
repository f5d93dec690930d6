pub mod activation;
pub mod backup;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod history;
pub mod model;
pub mod player;
pub mod playlist;
pub mod state;
pub mod storage;
pub mod sync;

// Wasm module
#[cfg(target_arch = "wasm32")]
pub mod wasm_client;
