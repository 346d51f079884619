pub fn to_hex(b: impl AsRef<[u8]>) -> String {
    let b = b.as_ref();
    let mut s = String::with_capacity(b.len() * 2);
    for &b in b {
        s.push(nibble_to_hex(b >> 4) as char);
        s.push(nibble_to_hex(b & 0xf) as char);
    }
    s
}

fn nibble_to_hex(n: u8) -> u8 {
    match n {
        n @ 0..=9 => b'0' + n,
        n => b'a' + n - 10,
    }
}
