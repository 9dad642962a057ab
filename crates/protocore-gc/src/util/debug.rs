//! Formatting helpers for diagnostic output.

/// Format `address` as a fixed-width hex string, e.g. for logging cell or
/// block addresses.
pub fn format_address(address: usize) -> String {
    format!("0x{:016X}", address)
}

/// Render `bytes` as a `hexdump`-style listing, 16 bytes per line, prefixed
/// with `base` as the address of the first byte.
pub fn dump_bytes(base: usize, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        out.push_str(&format!("  {}: ", format_address(base + line * 16)));
        for byte in chunk {
            out.push_str(&format!("{byte:02X} "));
        }
        out.push('\n');
    }
    out
}
