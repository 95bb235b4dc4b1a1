//! Additive and XOR checksums.

/// XOR of every byte.
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}

/// 8-bit wrapping sum of every byte.
pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Fletcher-16 over bytes, returned as `[sum2, sum1]`.
pub fn fletcher16(data: &[u8]) -> [u8; 2] {
    let mut sum1: u16 = 0;
    let mut sum2: u16 = 0;

    for &b in data {
        sum1 = (sum1 + b as u16) % 255;
        sum2 = (sum2 + sum1) % 255;
    }

    [sum2 as u8, sum1 as u8]
}

/// Fletcher-32 over big-endian 16-bit words (odd trailing byte zero padded).
///
/// Output is `sum2` then `sum1`, both big-endian.
pub fn fletcher32(data: &[u8]) -> [u8; 4] {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;

    for chunk in data.chunks(2) {
        let word = u16::from_be_bytes([chunk[0], chunk.get(1).copied().unwrap_or(0)]);
        sum1 = (sum1 + word as u32) % 65535;
        sum2 = (sum2 + sum1) % 65535;
    }

    let [a, b] = (sum2 as u16).to_be_bytes();
    let [c, d] = (sum1 as u16).to_be_bytes();
    [a, b, c, d]
}
