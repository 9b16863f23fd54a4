use crate::LuaValue;

/// Parses a Lua numeral the way `tonumber`/arithmetic string-coercion does:
/// decimal integers/floats, scientific notation, hex integers, and hex
/// floats with a `p`/`P` binary exponent. Rejects "inf"/"nan" spellings that
/// Rust's own float parser would otherwise accept, and anything containing a
/// NUL byte.
pub fn parse_lua_number(s: &str) -> LuaValue {
    let s = s.trim();
    if s.is_empty() || s.contains('\0') {
        return LuaValue::nil();
    }

    // Handle sign
    let (sign, rest) = if let Some(r) = s.strip_prefix('-') {
        (-1i64, r)
    } else if let Some(r) = s.strip_prefix('+') {
        (1i64, r)
    } else {
        (1i64, s)
    };

    if rest.is_empty() {
        return LuaValue::nil();
    }

    // Check for hex prefix (0x or 0X)
    if rest.starts_with("0x") || rest.starts_with("0X") {
        return parse_hex(&rest[2..], sign);
    }

    // Reject the float-parser spellings Lua doesn't accept as numerals.
    let lower = rest.to_ascii_lowercase();
    if lower == "inf" || lower == "infinity" || lower == "nan" {
        return LuaValue::nil();
    }

    // Decimal number - determine if integer or float
    let has_dot = rest.contains('.');
    let has_exponent = lower.contains('e');

    if !has_dot && !has_exponent {
        // Try as integer first; Lua integers wrap on overflow only via
        // arithmetic, not via literal parsing, so an out-of-range literal
        // falls back to float like the reference implementation.
        if let Ok(i) = rest.parse::<i64>() {
            return LuaValue::integer(sign * i);
        }
    }

    if !rest.bytes().all(|b| {
        b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || b == b'+' || b == b'-'
    }) {
        return LuaValue::nil();
    }

    // Try as float (either has '.'/'e' or integer parse failed due to overflow)
    match rest.parse::<f64>() {
        Ok(f) => LuaValue::float(sign as f64 * f),
        Err(_) => LuaValue::nil(),
    }
}

/// Parses the digits after `0x`/`0X`: a plain hex integer (wrapping to i64
/// like a bitwise literal) or a hex float `[digits][.digits][pP[+-]exp]`
/// whose mantissa is base-16 and whose exponent is a power of two.
fn parse_hex(hex_part: &str, sign: i64) -> LuaValue {
    if hex_part.is_empty() {
        return LuaValue::nil();
    }

    let lower = hex_part.to_ascii_lowercase();
    if !lower.contains('.') && !lower.contains('p') {
        // Plain hex integer: wraps modulo 2^64 digit-by-digit, matching Lua's
        // own numeral lexer rather than failing on >16 hex digits.
        if !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return LuaValue::nil();
        }
        let mut acc: u64 = 0;
        for b in hex_part.bytes() {
            let d = (b as char).to_digit(16).unwrap() as u64;
            acc = acc.wrapping_mul(16).wrapping_add(d);
        }
        return LuaValue::integer(sign.wrapping_mul(acc as i64));
    }

    parse_hex_float(hex_part, sign)
}

/// Parses a C99/Lua hex-float: mantissa in base 16 (optional `.` separating
/// integer and fractional hex digits) followed by an optional `p`/`P`
/// exponent giving a power of two. At least one mantissa hex digit is
/// required; the `p` exponent, if present, must have at least one decimal
/// digit.
fn parse_hex_float(hex_part: &str, sign: i64) -> LuaValue {
    let bytes = hex_part.as_bytes();
    let mut i = 0usize;

    let mut mantissa: f64 = 0.0;
    let mut any_digits = false;

    while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
        let d = (bytes[i] as char).to_digit(16).unwrap();
        mantissa = mantissa * 16.0 + d as f64;
        any_digits = true;
        i += 1;
    }

    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let mut scale = 1.0f64 / 16.0;
        while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
            let d = (bytes[i] as char).to_digit(16).unwrap();
            mantissa += d as f64 * scale;
            scale /= 16.0;
            any_digits = true;
            i += 1;
        }
    }

    if !any_digits {
        return LuaValue::nil();
    }

    let mut exponent: i32 = 0;
    if i < bytes.len() && (bytes[i] == b'p' || bytes[i] == b'P') {
        i += 1;
        let mut exp_sign: i32 = 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            if bytes[i] == b'-' {
                exp_sign = -1;
            }
            i += 1;
        }
        let exp_start = i;
        let mut exp_value: i32 = 0;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            exp_value = exp_value.saturating_mul(10).saturating_add((bytes[i] - b'0') as i32);
            i += 1;
        }
        if i == exp_start {
            // 'p'/'P' present but no exponent digits: malformed.
            return LuaValue::nil();
        }
        exponent = exp_sign * exp_value;
    }

    if i != bytes.len() {
        // Trailing garbage after the mantissa/exponent.
        return LuaValue::nil();
    }

    let value = mantissa * 2f64.powi(exponent);
    LuaValue::float(sign as f64 * value)
}
