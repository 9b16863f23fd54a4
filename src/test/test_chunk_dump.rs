#[cfg(test)]
use crate::lua_vm::LuaVM;
use crate::lua_vm::SafeOption;

#[test]
fn test_dump_load_roundtrip_returns_same_value() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local function f(a, b) return a + b, a * b end
        local bytes = string.dump(f)
        local g = load(bytes)
        local s, p = g(3, 4)
        assert(s == 7)
        assert(p == 12)
        "#,
    );
    assert!(result.is_ok(), "dump/load roundtrip failed: {:?}", result);
}

#[test]
fn test_dump_load_preserves_string_constants() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local function f() return "hello world" end
        local g = load(string.dump(f))
        assert(g() == "hello world")
        "#,
    );
    assert!(result.is_ok(), "string constant roundtrip failed: {:?}", result);
}

#[test]
fn test_dump_stripped_still_callable() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local function f(x) return x * 2 end
        local g = load(string.dump(f, true))
        assert(g(21) == 42)
        "#,
    );
    assert!(result.is_ok(), "stripped dump failed: {:?}", result);
}

#[test]
fn test_load_rejects_garbage_binary() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local ok, err = load("\27not a real chunk")
        assert(ok == nil)
        assert(type(err) == "string")
        "#,
    );
    assert!(result.is_ok(), "garbage binary load should fail gracefully: {:?}", result);
}

#[test]
fn test_load_text_chunk_with_custom_env() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();

    let result = vm.execute_string(
        r#"
        local env = { x = 10 }
        local f = load("return x + 1", "chunk", "t", env)
        assert(f() == 11)
        "#,
    );
    assert!(result.is_ok(), "custom _ENV load failed: {:?}", result);
}
