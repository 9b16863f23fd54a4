// Tests for the binary pack/unpack engine (string.pack/unpack/packsize).
use crate::*;

#[test]
fn test_pack_unpack_fixed_width_roundtrip() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local s = string.pack("i4", 12345)
        assert(#s == 4)
        local v, pos = string.unpack("i4", s)
        assert(v == 12345)
        assert(pos == 5)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_pack_big_endian_variable_size_int() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    // scenario 5 from the end-to-end spec: 3-byte big-endian signed int
    let result = vm.execute_string(
        r#"
        local s = string.pack(">i3", -1)
        local a, p = string.unpack(">i3", s)
        assert(#s == 3)
        assert(a == -1)
        assert(p == 4)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_pack_endianness_modifiers() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local le = string.pack("<I2", 0x1234)
        local be = string.pack(">I2", 0x1234)
        assert(le ~= be)
        assert(string.unpack("<I2", le) == 0x1234)
        assert(string.unpack(">I2", be) == 0x1234)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_pack_string_formats() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        -- z: NUL-terminated
        local s = string.pack("z", "hi")
        assert(s == "hi\0")
        assert(string.unpack("z", s) == "hi")

        -- c[n]: fixed-size
        local s2 = string.pack("c5", "hi")
        assert(#s2 == 5)
        assert(string.unpack("c5", s2) == "hi\0\0\0")

        -- s: length-prefixed (default 8-byte prefix)
        local s3 = string.pack("s1", "abc")
        local v, pos = string.unpack("s1", s3)
        assert(v == "abc")
        assert(pos == 5)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_packsize_fixed_formats() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(string.packsize("b") == 1)
        assert(string.packsize("h") == 2)
        assert(string.packsize("i4") == 4)
        assert(string.packsize("d") == 8)
        assert(string.packsize("bhi4") == 7)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_packsize_rejects_variable_length_formats() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(r#"string.packsize("s1")"#);
    assert!(result.is_err());
    let result = vm.execute_string(r#"string.packsize("z")"#);
    assert!(result.is_err());
}

#[test]
fn test_pack_overflow_raises() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    // 300 doesn't fit in a signed byte
    let result = vm.execute_string(r#"string.pack("b", 300)"#);
    assert!(result.is_err());
    // a negative value doesn't fit in an unsigned field
    let result = vm.execute_string(r#"string.pack("B", -1)"#);
    assert!(result.is_err());
}

#[test]
fn test_pack_out_of_limits_integer_size() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    // i17 exceeds the 1..=16 byte range string.pack accepts
    let result = vm.execute_string(r#"string.pack("i17", 0)"#);
    assert!(result.is_err());
}

#[test]
fn test_unpack_wide_integer_sign_extension() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        -- 9-byte signed int that fits in a Lua integer once sign-extended
        local s = string.pack("i9", -5)
        local v = string.unpack("i9", s)
        assert(v == -5)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}

#[test]
fn test_pack_alignment_padding() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        -- under !4 alignment, a leading byte then an i4 should pad 3 zero bytes
        local s = string.pack("!4Bi4", 1, 2)
        assert(#s == 8)
    "#,
    );
    assert!(result.is_ok(), "{:?}", result.err());
}
