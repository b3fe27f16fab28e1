use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to allocate a new Lua state")]
    StateAlloc,

    #[error("Registry field '{field}' has unexpected shape: expected {expected}, found {found}")]
    EngineState {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("Lua error: {0}")]
    Runtime(String),

    #[error("Interior NUL byte in string passed to the engine: {0}")]
    Nul(#[from] std::ffi::NulError),
}
