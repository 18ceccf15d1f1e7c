//! Small free functions that sit outside the protocol engine's contract
//! (`spec.md` §9's "open question" helper) or are shared formatting logic
//! used by the engine's data-row emission.

/// Formats `value` as fixed-point decimal text with `decimals` places after
/// the point, sign-aware, with a mandatory leading zero before the point.
/// Mirrors `putValue` in `examples/original_source/app/modules/s4pp.c`: the
/// digits are produced right-to-left and reversed into the output.
pub fn format_value(value: i32, decimals: u8) -> String {
    let neg = value < 0;
    let mut v: u32 = if neg { value.unsigned_abs() } else { value as u32 };
    let mut digits_remaining = decimals as i32;

    let mut reversed = Vec::with_capacity(16);
    loop {
        let digit = (v % 10) as u8;
        v /= 10;
        if digits_remaining == 0 && !reversed.is_empty() {
            reversed.push(b'.');
        }
        if !reversed.is_empty() || digit != 0 || digits_remaining <= 0 {
            reversed.push(b'0' + digit);
        }
        digits_remaining -= 1;
        if v == 0 && digits_remaining < 0 {
            break;
        }
    }
    if neg {
        reversed.push(b'-');
    }
    reversed.reverse();
    String::from_utf8(reversed).expect("digits, '.', and '-' are valid utf8")
}

/// One-byte rolling-XOR decode, named for the original `s4pp_tpedecode`
/// utility. Its purpose in the original firmware is undocumented; it is
/// exposed here as a standalone helper outside the protocol engine's
/// contract, per `spec.md` §9's open question.
///
/// Each output byte is the XOR of the input byte with a rolling key that
/// starts at 171 and becomes the *input* byte just decoded.
pub fn tpe_decode(data: &mut [u8]) {
    let mut key: u8 = 171;
    for byte in data.iter_mut() {
        let decoded = key ^ *byte;
        key = *byte;
        *byte = decoded;
    }
}

/// Rotates a DNS server list by one position after a resolution failure,
/// per `rotate_dns_servers` in `app/modules/s4pp.c`. Returns the server to
/// retry against next.
pub fn rotate_dns_servers(servers: &mut Vec<String>) -> Option<&str> {
    if servers.is_empty() {
        return None;
    }
    let first = servers.remove(0);
    servers.push(first);
    servers.first().map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_positive_values_with_decimals() {
        assert_eq!(format_value(1234, 2), "12.34");
        assert_eq!(format_value(5, 2), "0.05");
        assert_eq!(format_value(0, 0), "0");
    }

    #[test]
    fn formats_negative_values() {
        assert_eq!(format_value(-1234, 2), "-12.34");
        assert_eq!(format_value(-5, 0), "-5");
    }

    #[test]
    fn zero_decimals_has_no_point() {
        assert_eq!(format_value(42, 0), "42");
    }

    #[test]
    fn tpe_decode_round_trips_with_itself() {
        // The rolling key is derived from ciphertext bytes, so applying the
        // same transform twice does not invert it; this test only pins the
        // exact byte sequence the algorithm produces.
        let mut data = vec![171 ^ b'h', b'h' ^ b'i', b'i' ^ b'!'];
        tpe_decode(&mut data);
        assert_eq!(data, vec![b'h', b'i', b'!']);
    }

    #[test]
    fn dns_rotation_cycles_through_all_servers() {
        let mut servers = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(rotate_dns_servers(&mut servers), Some("b"));
        assert_eq!(rotate_dns_servers(&mut servers), Some("c"));
        assert_eq!(rotate_dns_servers(&mut servers), Some("a"));
    }

    #[test]
    fn dns_rotation_on_empty_list_is_none() {
        let mut servers: Vec<String> = Vec::new();
        assert_eq!(rotate_dns_servers(&mut servers), None);
    }
}
