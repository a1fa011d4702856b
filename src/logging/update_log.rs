//! Plain-text update log kept in the application data directory
//!
//! Every update run that produced warnings appends one block to
//! `<data_dir>/database-update-logs.txt`, framed by START/END markers carrying
//! the same timestamp. Writing this file never fails an update.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the update log inside the data directory
pub const UPDATE_LOG_FILE: &str = "database-update-logs.txt";

/// Path of the update log for a data directory
pub fn update_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(UPDATE_LOG_FILE)
}

fn render_block(text: &str, timestamp: &str) -> String {
    format!(
        "********** START OF DATABASE UPDATE LOGS AS AT {timestamp} **********\n\n\
         {text}\n\n\
         *********** END OF DATABASE UPDATE LOGS AS AT {timestamp} ***********\n\n"
    )
}

/// Appends `text` to the update log
///
/// I/O failures are logged as warnings and swallowed.
pub fn write_update_messages(data_dir: &Path, text: &str) {
    let path = update_log_path(data_dir);
    let timestamp = Local::now().format("%a %b %d %H:%M:%S %Z %Y").to_string();
    let block = render_block(text, &timestamp);

    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| {
            file.write_all(block.as_bytes())?;
            file.flush()
        });

    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Appended database update log"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to write to the database update log file"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_block_markers() {
        let block = render_block("renamed Clinic to Clinic_1", "T0");
        let lines: Vec<&str> = block.lines().collect();

        assert_eq!(
            lines[0],
            "********** START OF DATABASE UPDATE LOGS AS AT T0 **********"
        );
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "renamed Clinic to Clinic_1");
        assert_eq!(lines[3], "");
        assert_eq!(
            lines[4],
            "*********** END OF DATABASE UPDATE LOGS AS AT T0 ***********"
        );
        assert!(block.ends_with("***********\n\n"));
    }

    #[test]
    fn test_write_update_messages_appends() {
        let dir = TempDir::new().unwrap();
        write_update_messages(dir.path(), "first");
        write_update_messages(dir.path(), "second");

        let contents = std::fs::read_to_string(update_log_path(dir.path())).unwrap();
        assert_eq!(contents.matches("START OF DATABASE UPDATE LOGS").count(), 2);
        assert!(contents.find("first").unwrap() < contents.find("second").unwrap());
    }

    #[test]
    fn test_write_update_messages_swallows_io_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        write_update_messages(&missing, "lost");
        assert!(!update_log_path(&missing).exists());
    }
}
