//! Lua Stack Bridge
//!
//! Thin bridge between a Rust embedding host and an embedded Lua 5.4
//! engine, operating at the C-API level through `mlua::ffi`.
//!
//! # Architecture
//!
//! - **LuaStack**: handle to one engine state (owned or host-borrowed)
//!   exposing stack manipulation, value coercion, chunk execution and
//!   error raising
//! - **package operations**: module search-path augmentation and
//!   loaded-registry unload/reload
//! - **bindings**: host-native functions (`host.log`, `host.time`)
//!   registered into a state's globals
//!
//! The bridge holds no state of its own; every call mutates the engine
//! context it is given. States are single-threaded - `LuaStack` is neither
//! `Send` nor `Sync`, and callers must serialize access per state.

pub mod bindings;
pub mod error;
pub mod stack;

mod package;

pub use bindings::register_host_module;
pub use error::{BridgeError, Result};
pub use stack::LuaStack;
