// Tests for the integer/float number model: wraparound, math.type, tonumber parsing.
use crate::*;

#[test]
fn test_integer_wraparound() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(math.maxinteger + 1 == math.mininteger)
        assert(math.mininteger - 1 == math.maxinteger)
        assert(math.type(math.maxinteger + 1) == "integer")
        assert(-math.mininteger == math.mininteger)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_math_type_tags() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(math.type(1) == "integer")
        assert(math.type(1.0) == "float")
        assert(math.type("1") == nil)
        assert(1 == 1.0)
        assert(math.type(1) ~= math.type(1.0))
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_division_and_floor_division() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(math.type(7 / 2) == "float")
        assert(7 // 2 == 3)
        assert(math.type(7 // 2) == "integer")
        assert(-7 // 2 == -4) -- floor toward -inf
        assert(7.0 // 2 == 3.0)
        assert(1 / 0 == math.huge)
        assert(1.0 // 0.0 == math.huge)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_floor_division_by_zero_integer_raises() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string("return 1 // 0");
    assert!(result.is_err());
}

#[test]
fn test_modulo_sign_rules() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(5 % 3 == 2)
        assert(-5 % 3 == 1)
        assert(5 % -3 == -1)
        assert(5.5 % 2 == 1.5)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_tonumber_parsing() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(tonumber("42") == 42)
        assert(tonumber("  42  ") == 42)
        assert(tonumber("3.14") == 3.14)
        assert(tonumber("0x1A") == 26)
        assert(tonumber("1e2") == 100.0)
        assert(tonumber("not a number") == nil)
        assert(tonumber("inf") == nil)
        assert(tonumber("nan") == nil)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_tostring_tonumber_roundtrip() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        for _, n in ipairs({0, 1, -1, 42, math.maxinteger, math.mininteger}) do
            assert(tonumber(tostring(n)) == n)
        end
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_integer_float_equality_boundary() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(2^53 == 9007199254740992.0)
        assert(1 == 1.0)
        assert(0 == -0.0)
        assert(0.0 == -0.0)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
