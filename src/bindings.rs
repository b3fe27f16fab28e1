//! Host-native bindings exposed to scripts
//!
//! Registers a global `host` table giving scripts access to the embedding
//! host's structured logging and clock:
//!
//! - `host.log.info(message)` - log through the host's `tracing` pipeline
//! - `host.time.now()` - wall clock as integer nanoseconds since the epoch
//!
//! Both natives raise an engine error on wrong arity, which script-side
//! `pcall` can catch.

use std::ffi::c_int;
use std::time::{SystemTime, UNIX_EPOCH};

use mlua::ffi;
use tracing::info;

use crate::error::Result;
use crate::stack::LuaStack;

/// Install the `host` table into the state's globals.
pub fn register_host_module(stack: &LuaStack) -> Result<()> {
    let state = stack.as_ptr();
    unsafe {
        ffi::lua_createtable(state, 0, 2); // host

        ffi::lua_createtable(state, 0, 1); // host.log
        ffi::lua_pushcclosure(state, host_log_info, 0);
        ffi::lua_setfield(state, -2, c"info".as_ptr());
        ffi::lua_setfield(state, -2, c"log".as_ptr());

        ffi::lua_createtable(state, 0, 1); // host.time
        ffi::lua_pushcclosure(state, host_time_now, 0);
        ffi::lua_setfield(state, -2, c"now".as_ptr());
        ffi::lua_setfield(state, -2, c"time".as_ptr());

        ffi::lua_setglobal(state, c"host".as_ptr());
    }
    Ok(())
}

unsafe extern "C-unwind" fn host_log_info(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    let argc = stack.top();
    if argc != 1 {
        stack.raise_error("host.log.info expects exactly one argument");
    }
    let message = stack.to_str(1).unwrap_or_default();
    info!(target: "host", "{}", message);
    0
}

unsafe extern "C-unwind" fn host_time_now(state: *mut ffi::lua_State) -> c_int {
    let stack = unsafe { LuaStack::from_raw(state) };
    if stack.top() != 0 {
        stack.raise_error("host.time.now takes no arguments");
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or(0);
    stack.push_integer(nanos);
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_log_info_is_callable() {
        let stack = LuaStack::new().unwrap();
        register_host_module(&stack).unwrap();

        stack.exec_string("host.log.info('hello from lua')").unwrap();
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_host_log_info_rejects_wrong_arity() {
        let stack = LuaStack::new().unwrap();
        register_host_module(&stack).unwrap();

        stack
            .exec_string(
                "local ok, err = pcall(host.log.info)\n\
                 assert(not ok)\n\
                 assert(string.find(err, 'one argument', 1, true))",
            )
            .unwrap();
    }

    #[test]
    fn test_host_time_now_returns_positive_number() {
        let stack = LuaStack::new().unwrap();
        register_host_module(&stack).unwrap();

        stack
            .exec_string(
                "local t = host.time.now()\n\
                 assert(type(t) == 'number')\n\
                 assert(t > 0)",
            )
            .unwrap();
    }

    #[test]
    fn test_host_time_now_rejects_arguments() {
        let stack = LuaStack::new().unwrap();
        register_host_module(&stack).unwrap();

        stack
            .exec_string(
                "local ok = pcall(host.time.now, 1)\n\
                 assert(not ok)",
            )
            .unwrap();
    }
}
