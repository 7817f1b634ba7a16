//! Identifier generation.

use rand::Rng;

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(bytes * 2);
    for _ in 0..bytes {
        let b: u8 = rng.gen();
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// A 128-bit trace id as 32 lowercase hex digits.
pub fn new_trace_id() -> String {
    loop {
        let id = random_hex(16);
        // All-zero ids are invalid in W3C.
        if id.bytes().any(|b| b != b'0') {
            return id;
        }
    }
}

/// A 64-bit span id as 16 lowercase hex digits.
pub fn new_span_id() -> String {
    loop {
        let id = random_hex(8);
        if id.bytes().any(|b| b != b'0') {
            return id;
        }
    }
}

/// Id for log and metric records.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shapes() {
        let t = new_trace_id();
        let s = new_span_id();
        assert_eq!(t.len(), 32);
        assert_eq!(s.len(), 16);
        assert!(t.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(new_span_id(), s);
    }
}
