//! CRC variants.
//!
//! CRC-8 and CRC-16 are table-driven; each table is built on first use and
//! shared read-only for the life of the process. CRC-32 is `crc32fast`.

use std::sync::OnceLock;

const CRC8_POLY: u8 = 0x07;
const CRC16_POLY: u16 = 0x1021;

static CRC8_TABLE: OnceLock<[u8; 256]> = OnceLock::new();
static CRC16_TABLE: OnceLock<[u16; 256]> = OnceLock::new();

fn crc8_table() -> &'static [u8; 256] {
    CRC8_TABLE.get_or_init(|| {
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u8;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 {
                    (crc << 1) ^ CRC8_POLY
                } else {
                    crc << 1
                };
            }
            *entry = crc;
        }
        table
    })
}

fn crc16_table() -> &'static [u16; 256] {
    CRC16_TABLE.get_or_init(|| {
        let mut table = [0u16; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = (i as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ CRC16_POLY
                } else {
                    crc << 1
                };
            }
            *entry = crc;
        }
        table
    })
}

/// CRC-8 (poly 0x07, init 0x00, no reflection).
pub fn crc8(data: &[u8]) -> u8 {
    let table = crc8_table();
    data.iter().fold(0u8, |crc, &b| table[(crc ^ b) as usize])
}

/// CRC-16/XMODEM (poly 0x1021, init 0x0000, no reflection).
pub fn crc16(data: &[u8]) -> u16 {
    let table = crc16_table();
    data.iter().fold(0u16, |crc, &b| {
        (crc << 8) ^ table[(((crc >> 8) as u8) ^ b) as usize]
    })
}

/// CRC-32/IEEE (reflected, init and xorout 0xFFFFFFFF).
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
