//! Module search-path and loaded-registry operations
//!
//! These calls mutate two well-known locations in the engine's global
//! registry: the `package.path` search-pattern string and the
//! `package.loaded` cache of previously required modules. Every operation
//! leaves the operand stack at its entry depth on all exit paths.

use std::ffi::CString;

use mlua::ffi;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::stack::LuaStack;

impl LuaStack {
    /// Append `dir` to the engine's module search path.
    ///
    /// Extends `package.path` with `;<dir>/?.lua`, where `?` is the
    /// engine's module-name placeholder. Repeated calls keep appending;
    /// duplicate entries are not deduplicated.
    ///
    /// # Errors
    /// Returns [`BridgeError::EngineState`] if `package` is not a table or
    /// `package.path` is not a string-coercible value.
    pub fn append_search_path(&self, dir: &str) -> Result<()> {
        let state = self.as_ptr();
        unsafe {
            if ffi::lua_getglobal(state, c"package".as_ptr()) != ffi::LUA_TTABLE {
                let found = self.type_name(-1);
                self.pop(1);
                return Err(BridgeError::EngineState {
                    field: "package",
                    expected: "table",
                    found,
                });
            }
            ffi::lua_getfield(state, -1, c"path".as_ptr());
            let current = match self.to_str(-1) {
                Some(path) => path,
                None => {
                    let found = self.type_name(-1);
                    self.pop(2);
                    return Err(BridgeError::EngineState {
                        field: "package.path",
                        expected: "string",
                        found,
                    });
                }
            };

            let extended = format!("{current};{dir}/?.lua");
            ffi::lua_pushlstring(state, extended.as_ptr().cast(), extended.len());
            ffi::lua_setfield(state, -3, c"path".as_ptr());
            self.pop(2);
        }

        debug!("Appended '{}' to module search path", dir);
        Ok(())
    }

    /// Remove `name` from the engine's loaded-module registry.
    ///
    /// Clears `package.loaded[name]` so the next load of `name` re-executes
    /// its source instead of returning the cached value. No-op for an empty
    /// `name` or a name that is not currently loaded.
    ///
    /// # Errors
    /// Returns [`BridgeError::EngineState`] if `package` or
    /// `package.loaded` is not a table.
    pub fn unload(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }

        let state = self.as_ptr();
        let cname = CString::new(name)?;
        unsafe {
            if ffi::lua_getglobal(state, c"package".as_ptr()) != ffi::LUA_TTABLE {
                let found = self.type_name(-1);
                self.pop(1);
                return Err(BridgeError::EngineState {
                    field: "package",
                    expected: "table",
                    found,
                });
            }
            if ffi::lua_getfield(state, -1, c"loaded".as_ptr()) != ffi::LUA_TTABLE {
                let found = self.type_name(-1);
                self.pop(2);
                return Err(BridgeError::EngineState {
                    field: "package.loaded",
                    expected: "table",
                    found,
                });
            }
            ffi::lua_getfield(state, -1, cname.as_ptr());
            if !self.is_nil(-1) {
                debug!("Unloading module '{}'", name);
                self.push_nil();
                ffi::lua_setfield(state, -3, cname.as_ptr());
            }
            self.pop(3);
        }
        Ok(())
    }

    /// Load module `name` through the engine's `require` mechanism.
    ///
    /// No-op for an empty `name`. The module's value is discarded; loading
    /// is performed for its side effects and for populating
    /// `package.loaded`.
    ///
    /// # Errors
    /// Returns [`BridgeError::EngineState`] if the `require` global is
    /// missing, or [`BridgeError::Runtime`] if resolution or execution of
    /// the module fails.
    pub fn load(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }

        debug!("Loading module '{}'", name);
        let state = self.as_ptr();
        unsafe {
            if ffi::lua_getglobal(state, c"require".as_ptr()) != ffi::LUA_TFUNCTION {
                let found = self.type_name(-1);
                self.pop(1);
                return Err(BridgeError::EngineState {
                    field: "require",
                    expected: "function",
                    found,
                });
            }
            self.push_str(name);
            if ffi::lua_pcall(state, 1, 0, 0) != ffi::LUA_OK {
                return Err(self.pop_runtime_error());
            }
        }
        Ok(())
    }

    /// Unload then re-load module `name`, forcing its source to re-execute.
    pub fn reload(&self, name: &str) -> Result<()> {
        self.unload(name)?;
        self.load(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_module(dir: &std::path::Path, name: &str, source: &str) {
        std::fs::write(dir.join(format!("{name}.lua")), source).unwrap();
    }

    #[test]
    fn test_append_search_path_appends_pattern() {
        let stack = LuaStack::new().unwrap();
        stack.exec_string("package.path = './?.lua'").unwrap();

        stack.append_search_path("mods").unwrap();
        stack
            .exec_string("assert(package.path == './?.lua;mods/?.lua')")
            .unwrap();
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_append_search_path_does_not_deduplicate() {
        let stack = LuaStack::new().unwrap();
        stack.exec_string("package.path = './?.lua'").unwrap();

        stack.append_search_path("mods").unwrap();
        stack.append_search_path("mods").unwrap();
        stack
            .exec_string("assert(package.path == './?.lua;mods/?.lua;mods/?.lua')")
            .unwrap();
    }

    #[test]
    fn test_append_search_path_without_package_table() {
        let stack = LuaStack::new().unwrap();
        stack.exec_string("package = nil").unwrap();

        let err = stack.append_search_path("mods").unwrap_err();
        assert!(matches!(
            err,
            BridgeError::EngineState {
                field: "package",
                ..
            }
        ));
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_append_search_path_with_non_string_path() {
        let stack = LuaStack::new().unwrap();
        stack.exec_string("package.path = {}").unwrap();

        let err = stack.append_search_path("mods").unwrap_err();
        assert!(matches!(
            err,
            BridgeError::EngineState {
                field: "package.path",
                ..
            }
        ));
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_unload_empty_name_is_noop() {
        let stack = LuaStack::new().unwrap();
        stack
            .exec_string(
                "before = 0\n\
                 for _ in pairs(package.loaded) do before = before + 1 end",
            )
            .unwrap();

        stack.unload("").unwrap();

        stack
            .exec_string(
                "local after = 0\n\
                 for _ in pairs(package.loaded) do after = after + 1 end\n\
                 assert(after == before)",
            )
            .unwrap();
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_unload_absent_name_leaves_registry_unchanged() {
        let stack = LuaStack::new().unwrap();
        stack
            .exec_string(
                "before = 0\n\
                 for _ in pairs(package.loaded) do before = before + 1 end",
            )
            .unwrap();

        stack.unload("definitely_not_loaded").unwrap();

        stack
            .exec_string(
                "local after = 0\n\
                 for _ in pairs(package.loaded) do after = after + 1 end\n\
                 assert(after == before)",
            )
            .unwrap();
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_unload_without_package_table() {
        let stack = LuaStack::new().unwrap();
        stack.exec_string("package = nil").unwrap();

        let err = stack.unload("anything").unwrap_err();
        assert!(matches!(err, BridgeError::EngineState { .. }));
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_load_missing_module_fails() {
        let stack = LuaStack::new().unwrap();
        let err = stack.load("definitely_not_on_disk").unwrap_err();
        match err {
            BridgeError::Runtime(message) => {
                assert!(message.contains("definitely_not_on_disk"));
            }
            other => panic!("expected Runtime error, got {other:?}"),
        }
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_load_empty_name_is_noop() {
        let stack = LuaStack::new().unwrap();
        stack.load("").unwrap();
        assert_eq!(stack.top(), 0);
    }

    #[test]
    fn test_unload_forces_module_to_reexecute() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "counter",
            "counter = (counter or 0) + 1\nreturn counter\n",
        );

        let stack = LuaStack::new().unwrap();
        stack
            .append_search_path(dir.path().to_str().unwrap())
            .unwrap();

        stack.load("counter").unwrap();
        stack.exec_string("assert(counter == 1)").unwrap();

        // Cached: a second load must not re-run the module body.
        stack.load("counter").unwrap();
        stack.exec_string("assert(counter == 1)").unwrap();

        stack.unload("counter").unwrap();
        stack.load("counter").unwrap();
        stack.exec_string("assert(counter == 2)").unwrap();
    }

    #[test]
    fn test_reload_reexecutes_in_one_call() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "counter",
            "counter = (counter or 0) + 1\nreturn counter\n",
        );

        let stack = LuaStack::new().unwrap();
        stack
            .append_search_path(dir.path().to_str().unwrap())
            .unwrap();

        stack.load("counter").unwrap();
        stack.reload("counter").unwrap();
        stack.exec_string("assert(counter == 2)").unwrap();
        assert_eq!(stack.top(), 0);
    }
}
