use crate::upload::SelectedFile;

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Whole bytes below a kilobyte, one decimal place above.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.1} {unit}")
}

pub fn file_label(file: &SelectedFile) -> String {
    format!("{} ({})", file.name, format_size(file.size()))
}
