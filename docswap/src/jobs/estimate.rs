//! Advisory conversion-duration heuristic.

use conversion_router::is_image_format;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
const MIN_SIZE_MIB: f64 = 0.1;
const MIN_ESTIMATE_SECS: u64 = 5;
const DEFAULT_SECS_PER_MIB: u64 = 2;

fn secs_per_mib(input: &str, output: &str) -> u64 {
    match (input, output) {
        ("pdf", "docx") => 3,
        ("pdf", "txt") => 1,
        ("pdf", "image") => 2,
        ("docx", "pdf") => 2,
        ("image", "pdf") => 1,
        _ => DEFAULT_SECS_PER_MIB,
    }
}

/// Estimate how many seconds converting `file_size` bytes will take.
///
/// Image formats collapse into a single `image` category, input side first.
pub fn estimate_duration(file_size: u64, input_format: &str, output_format: &str) -> u64 {
    let input = input_format.to_ascii_lowercase();
    let output = output_format.to_ascii_lowercase();

    let (input, output) = if is_image_format(&input) {
        ("image", output.as_str())
    } else if is_image_format(&output) {
        (input.as_str(), "image")
    } else {
        (input.as_str(), output.as_str())
    };

    let size_mib = (file_size as f64 / BYTES_PER_MIB).max(MIN_SIZE_MIB);
    let estimate = (secs_per_mib(input, output) as f64 * size_mib) as u64;
    estimate.max(MIN_ESTIMATE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_small_files_hit_floor() {
        assert_eq!(estimate_duration(0, "pdf", "docx"), 5);
        assert_eq!(estimate_duration(MIB, "pdf", "txt"), 5);
    }

    #[test]
    fn test_table_rates() {
        assert_eq!(estimate_duration(10 * MIB, "pdf", "docx"), 30);
        assert_eq!(estimate_duration(10 * MIB, "pdf", "txt"), 10);
        assert_eq!(estimate_duration(10 * MIB, "docx", "pdf"), 20);
        assert_eq!(estimate_duration(10 * MIB, "xlsx", "csv"), 20);
    }

    #[test]
    fn test_image_category() {
        assert_eq!(estimate_duration(10 * MIB, "PNG", "pdf"), 10);
        assert_eq!(estimate_duration(10 * MIB, "jpeg", "pdf"), 10);
        assert_eq!(estimate_duration(10 * MIB, "pdf", "png"), 20);
        // Input side wins when both are images.
        assert_eq!(estimate_duration(10 * MIB, "png", "jpg"), 20);
    }

    #[test]
    fn test_fractional_sizes_truncate() {
        // 3 s/MiB * 2.5 MiB = 7.5 -> 7
        assert_eq!(estimate_duration(5 * MIB / 2, "pdf", "docx"), 7);
    }
}
