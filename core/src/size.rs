//! Byte-size constants and formatting shared across the workspace.

pub const BYTE: u64 = 1;
pub const KIB: u64 = 1024 * BYTE;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

pub const KB: u64 = 1000 * BYTE;
pub const MB: u64 = 1000 * KB;
pub const GB: u64 = 1000 * MB;
pub const TB: u64 = 1000 * GB;

pub fn format_size(bytes: u64) -> String {
    if bytes >= TIB {
        format!("{:.2}TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.2}GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2}MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2}KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2 * KIB), "2.00KiB");
        assert_eq!(format_size(50 * GIB), "50.00GiB");
        assert_eq!(format_size(3 * TIB / 2), "1.50TiB");
    }
}
