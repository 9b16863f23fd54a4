// Lua-compatible float-to-string formatting, shared by `tostring`/`..` and
// `string.format`'s `%g`/`%G` specifiers.

/// C printf-style `%g`/`%G`: `precision` significant digits, switching to
/// exponential notation when the exponent is `< -4` or `>= precision`.
/// `keep_trailing_zeros` mirrors the `#` flag (off by default, which trims).
pub fn format_g(v: f64, precision: usize, uppercase: bool, keep_trailing_zeros: bool) -> String {
    if v.is_nan() {
        return if uppercase { "NAN".to_string() } else { "nan".to_string() };
    }
    if v.is_infinite() {
        let s = if v.is_sign_negative() { "-inf" } else { "inf" };
        return if uppercase { s.to_uppercase() } else { s.to_string() };
    }

    let precision = precision.max(1);

    if v == 0.0 {
        let mut s = String::new();
        if v.is_sign_negative() {
            s.push('-');
        }
        s.push('0');
        if keep_trailing_zeros && precision > 1 {
            s.push('.');
            s.push_str(&"0".repeat(precision - 1));
        }
        return s;
    }

    let sci = format!("{:.*e}", precision - 1, v);
    let epos = sci.find('e').expect("scientific format always has an exponent");
    let exponent: i32 = sci[epos + 1..]
        .parse()
        .expect("exponent is always a valid integer");

    let mut body = if exponent < -4 || exponent >= precision as i32 {
        let mantissa = &sci[..epos];
        let mantissa = if keep_trailing_zeros {
            mantissa.to_string()
        } else {
            trim_trailing_zeros(mantissa)
        };
        format!(
            "{}e{}{:02}",
            mantissa,
            if exponent < 0 { "-" } else { "+" },
            exponent.abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        let fixed = format!("{:.*}", decimals, v);
        if keep_trailing_zeros {
            fixed
        } else {
            trim_trailing_zeros(&fixed)
        }
    };

    if uppercase {
        body = body.to_uppercase();
    }
    body
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Lua's `tostring`/concat rule for floats: `%.14g`, with a trailing `.0`
/// appended when the result would otherwise read as an integer literal, so a
/// float is always visually distinguishable from an integer of the same
/// value (`math.type` invariant).
pub fn lua_tostring_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v.is_sign_negative() {
            "-inf".to_string()
        } else {
            "inf".to_string()
        };
    }
    let mut s = format_g(v, 14, false, false);
    if !s.contains('.') && !s.contains('e') {
        s.push_str(".0");
    }
    s
}

/// C99 `%a`/`%A` hex-float formatting. `precision` is the number of hex
/// digits after the point; `None` means "as many as needed, trimmed".
pub fn format_hex_float(v: f64, precision: Option<usize>, uppercase: bool) -> String {
    if v.is_nan() {
        return if uppercase { "NAN".to_string() } else { "nan".to_string() };
    }
    if v.is_infinite() {
        let s = if v.is_sign_negative() { "-inf" } else { "inf" };
        return if uppercase { s.to_uppercase() } else { s.to_string() };
    }

    let neg = v.is_sign_negative();
    let bits = v.to_bits();
    let exp_bits = ((bits >> 52) & 0x7FF) as i64;
    let mantissa_bits = bits & 0x000F_FFFF_FFFF_FFFF;

    let (lead, exponent) = if exp_bits == 0 {
        if mantissa_bits == 0 {
            (0u64, 0i64)
        } else {
            (0u64, -1022i64)
        }
    } else {
        (1u64, exp_bits - 1023)
    };

    let mut hex_digits = format!("{:013x}", mantissa_bits);
    hex_digits = match precision {
        Some(p) => round_hex_digits(&hex_digits, p),
        None => {
            let trimmed = hex_digits.trim_end_matches('0');
            trimmed.to_string()
        }
    };

    let mut s = String::new();
    if neg {
        s.push('-');
    }
    s.push_str("0x");
    s.push_str(&lead.to_string());
    if !hex_digits.is_empty() {
        s.push('.');
        s.push_str(&hex_digits);
    }
    s.push('p');
    s.push(if exponent < 0 { '-' } else { '+' });
    s.push_str(&exponent.abs().to_string());

    if uppercase { s.to_uppercase() } else { s }
}

fn round_hex_digits(digits: &str, precision: usize) -> String {
    if precision >= digits.len() {
        let mut s = digits.to_string();
        s.push_str(&"0".repeat(precision - digits.len()));
        return s;
    }
    if precision == 0 {
        return String::new();
    }
    let keep = &digits[..precision];
    let round_up = u8::from_str_radix(&digits[precision..precision + 1], 16).unwrap_or(0) >= 8;
    if !round_up {
        return keep.to_string();
    }
    let value = u64::from_str_radix(keep, 16).unwrap_or(0) + 1;
    format!("{:0width$x}", value, width = precision)
}
