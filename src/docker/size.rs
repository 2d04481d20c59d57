//! Human-readable byte sizes as printed by `docker stats`

/// Separator between the used and limit halves of a memory usage column
pub const USAGE_SEPARATOR: &str = " / ";

/// Convert `<number><unit>` to megabytes.
///
/// Only `KiB`, `MiB` and `GiB` are recognised (case-sensitive). Anything else,
/// including a number that does not parse, is `0.0`.
pub fn parse_byte_size(size: &str) -> f64 {
    let size = size.trim();

    let (number, scale) = if let Some(number) = size.strip_suffix("KiB") {
        (number, 1.0 / 1024.0)
    } else if let Some(number) = size.strip_suffix("MiB") {
        (number, 1.0)
    } else if let Some(number) = size.strip_suffix("GiB") {
        (number, 1024.0)
    } else {
        return 0.0;
    };

    match number.trim().parse::<f64>() {
        Ok(value) => value * scale,
        Err(_) => 0.0,
    }
}

/// Split `"<used> / <limit>"` and convert both halves to megabytes
pub fn parse_usage_pair(field: &str) -> (f64, f64) {
    let halves: Vec<&str> = field.split(USAGE_SEPARATOR).collect();
    match halves.as_slice() {
        [used, limit] => (parse_byte_size(used), parse_byte_size(limit)),
        _ => (0.0, 0.0),
    }
}
