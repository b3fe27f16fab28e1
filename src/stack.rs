//! Low-level access to a Lua execution context
//!
//! `LuaStack` wraps a raw `lua_State` pointer and exposes the subset of the
//! C API the embedding host needs: stack manipulation, value coercion, chunk
//! execution and error raising. It holds no state of its own - every call
//! mutates the engine's operand stack or registry directly.

use std::ffi::{CStr, CString, c_int};
use std::ptr;

use mlua::ffi;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Handle to one running Lua engine instance.
///
/// A handle is either *owned* (created by [`LuaStack::new`], closed on drop)
/// or *borrowed* (wrapped around a host-supplied pointer via
/// [`LuaStack::from_raw`], left open on drop). All operations behave
/// identically in both cases.
///
/// The engine is not thread-safe: a `LuaStack` is neither `Send` nor `Sync`,
/// and callers must serialize access per state.
pub struct LuaStack {
    state: *mut ffi::lua_State,
    owned: bool,
}

impl LuaStack {
    /// Create a fresh Lua state with the standard libraries opened.
    ///
    /// # Errors
    /// Returns [`BridgeError::StateAlloc`] if the engine cannot allocate a
    /// new state.
    pub fn new() -> Result<Self> {
        let state = unsafe { ffi::luaL_newstate() };
        if state.is_null() {
            return Err(BridgeError::StateAlloc);
        }
        unsafe { ffi::luaL_openlibs(state) };

        debug!("Created new Lua state with standard libraries");
        Ok(Self { state, owned: true })
    }

    /// Wrap a host-supplied state without taking ownership.
    ///
    /// The state is not closed when the wrapper is dropped.
    ///
    /// # Safety
    /// `state` must point to a live `lua_State` that outlives the returned
    /// wrapper, and must not be accessed from another thread while the
    /// wrapper is in use.
    pub unsafe fn from_raw(state: *mut ffi::lua_State) -> Self {
        Self {
            state,
            owned: false,
        }
    }

    /// Get the raw state pointer for direct C API calls.
    pub fn as_ptr(&self) -> *mut ffi::lua_State {
        self.state
    }

    /// Number of values currently on the operand stack.
    pub fn top(&self) -> i32 {
        unsafe { ffi::lua_gettop(self.state) }
    }

    /// Remove every value from the operand stack.
    pub fn clear(&self) {
        unsafe { ffi::lua_settop(self.state, 0) };
    }

    /// Normalize a possibly-negative stack index to an absolute position.
    pub fn abs_index(&self, index: i32) -> i32 {
        unsafe { ffi::lua_absindex(self.state, index) }
    }

    /// Check whether the value at `index` is the engine's nil sentinel.
    pub fn is_nil(&self, index: i32) -> bool {
        unsafe { ffi::lua_type(self.state, index) == ffi::LUA_TNIL }
    }

    /// Coerce the value at `index` to an integer.
    ///
    /// Uses the engine's own coercion rules; non-coercible values yield 0.
    pub fn to_integer(&self, index: i32) -> i64 {
        unsafe { ffi::lua_tointegerx(self.state, index, ptr::null_mut()) }
    }

    /// Coerce the value at `index` to a float.
    ///
    /// Uses the engine's own coercion rules; non-coercible values yield 0.0.
    pub fn to_number(&self, index: i32) -> f64 {
        unsafe { ffi::lua_tonumberx(self.state, index, ptr::null_mut()) }
    }

    /// Read the value at `index` as a boolean (engine truthiness rules).
    pub fn to_bool(&self, index: i32) -> bool {
        unsafe { ffi::lua_toboolean(self.state, index) != 0 }
    }

    /// Read the value at `index` as a string.
    ///
    /// Returns `None` if the value is not string-coercible. Note that the
    /// engine converts numbers to strings in place.
    pub fn to_str(&self, index: i32) -> Option<String> {
        let mut len = 0usize;
        let data = unsafe { ffi::lua_tolstring(self.state, index, &mut len) };
        if data.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) };
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Move the value at the top of the stack to `index`, shifting the
    /// values above that position up by one slot.
    pub fn insert(&self, index: i32) {
        unsafe { ffi::lua_rotate(self.state, index, 1) };
    }

    /// Remove `n` values from the top of the stack.
    pub fn pop(&self, n: i32) {
        unsafe { ffi::lua_settop(self.state, -n - 1) };
    }

    pub fn push_nil(&self) {
        unsafe { ffi::lua_pushnil(self.state) };
    }

    pub fn push_bool(&self, value: bool) {
        unsafe { ffi::lua_pushboolean(self.state, value as c_int) };
    }

    pub fn push_integer(&self, value: i64) {
        unsafe { ffi::lua_pushinteger(self.state, value) };
    }

    pub fn push_number(&self, value: f64) {
        unsafe { ffi::lua_pushnumber(self.state, value) };
    }

    pub fn push_str(&self, value: &str) {
        unsafe { ffi::lua_pushlstring(self.state, value.as_ptr().cast(), value.len()) };
    }

    /// Push a native function onto the stack.
    pub fn push_function(&self, f: ffi::lua_CFunction) {
        unsafe { ffi::lua_pushcclosure(self.state, f, 0) };
    }

    /// Pop the value at the top of the stack and store it as a global.
    pub fn set_global(&self, name: &str) -> Result<()> {
        let cname = CString::new(name)?;
        unsafe { ffi::lua_setglobal(self.state, cname.as_ptr()) };
        Ok(())
    }

    /// Raise an engine error carrying `message`.
    ///
    /// Control transfers to the engine's unwind path and never returns to
    /// the caller. Only valid inside a native function invoked by the
    /// engine (i.e. under a protected call); bridge-side logic that can
    /// fail returns [`Result`] instead.
    pub fn raise_error(&self, message: &str) -> ! {
        unsafe {
            ffi::lua_pushlstring(self.state, message.as_ptr().cast(), message.len());
            ffi::lua_error(self.state);
        }
        unreachable!("lua_error returned normally")
    }

    /// Compile and run a chunk of Lua source in a protected call.
    ///
    /// # Errors
    /// Returns [`BridgeError::Runtime`] carrying the engine's message if the
    /// chunk fails to compile or raises at runtime. The stack is left at its
    /// pre-call depth on every exit path.
    pub fn exec_string(&self, code: &str) -> Result<()> {
        let ccode = CString::new(code)?;
        unsafe {
            if ffi::luaL_loadstring(self.state, ccode.as_ptr()) != ffi::LUA_OK {
                return Err(self.pop_runtime_error());
            }
            if ffi::lua_pcall(self.state, 0, 0, 0) != ffi::LUA_OK {
                return Err(self.pop_runtime_error());
            }
        }
        Ok(())
    }

    /// Call a global function with `nargs` arguments already pushed.
    ///
    /// The function value is fetched by name and inserted beneath the
    /// arguments, then invoked in a protected call leaving `nresults`
    /// values on the stack.
    ///
    /// # Errors
    /// Returns [`BridgeError::EngineState`] if the global is not a function
    /// (the pushed arguments are discarded), or [`BridgeError::Runtime`] if
    /// the call raises.
    pub fn call_global(&self, name: &str, nargs: i32, nresults: i32) -> Result<()> {
        let cname = CString::new(name)?;
        unsafe {
            if ffi::lua_getglobal(self.state, cname.as_ptr()) != ffi::LUA_TFUNCTION {
                let found = self.type_name(-1);
                self.pop(nargs + 1);
                return Err(BridgeError::EngineState {
                    field: "global function",
                    expected: "function",
                    found,
                });
            }
            if nargs > 0 {
                self.insert(-(nargs + 1));
            }
            if ffi::lua_pcall(self.state, nargs, nresults, 0) != ffi::LUA_OK {
                return Err(self.pop_runtime_error());
            }
        }
        Ok(())
    }

    /// Name of the engine type of the value at `index`.
    pub(crate) fn type_name(&self, index: i32) -> String {
        unsafe {
            let tp = ffi::lua_type(self.state, index);
            CStr::from_ptr(ffi::lua_typename(self.state, tp))
                .to_string_lossy()
                .into_owned()
        }
    }

    /// Pop the error value left by a failed protected call and wrap it.
    pub(crate) fn pop_runtime_error(&self) -> BridgeError {
        let message = self
            .to_str(-1)
            .unwrap_or_else(|| format!("({} error value)", self.type_name(-1)));
        self.pop(1);
        BridgeError::Runtime(message)
    }
}

impl Drop for LuaStack {
    fn drop(&mut self) {
        if self.owned {
            unsafe { ffi::lua_close(self.state) };
        }
    }
}
