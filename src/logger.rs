use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Logger manager supporting dynamic progress display and detailed logging
pub struct Logger {
    writer: BufWriter<Box<dyn Write>>,
    last_progress: String,
    show_progress: bool,
}

impl Logger {
    pub fn new(file: File) -> Self {
        Self::from_writer(Box::new(file))
    }

    pub fn from_writer(writer: Box<dyn Write>) -> Self {
        Self {
            writer: BufWriter::new(writer),
            last_progress: String::new(),
            show_progress: true,
        }
    }

    /// Logger that writes nowhere and prints nothing.
    pub fn silent() -> Self {
        Self {
            show_progress: false,
            ..Self::from_writer(Box::new(io::sink()))
        }
    }

    /// Record detailed log information
    pub fn log(&mut self, message: &str) -> io::Result<()> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(self.writer, "[{}] {}", timestamp, message)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Display dynamic progress information (overwrite previous line)
    pub fn progress(&mut self, message: &str) -> io::Result<()> {
        if !self.show_progress {
            return Ok(());
        }
        if !self.last_progress.is_empty() {
            print!("\r{}", " ".repeat(self.last_progress.len()));
        }
        print!("\r{}", message);
        io::stdout().flush()?;

        self.last_progress = message.to_string();
        Ok(())
    }

    /// Finish progress display
    pub fn finish_progress(&mut self) -> io::Result<()> {
        if !self.last_progress.is_empty() {
            println!();
            self.last_progress.clear();
        }
        Ok(())
    }

    /// Record log and display progress simultaneously
    pub fn log_and_progress(&mut self, message: &str) -> io::Result<()> {
        self.log(message)?;
        self.progress(message)?;
        Ok(())
    }
}

/// Format time as "xx h xx m xx.xxx s" format
pub fn format_time_used(elapsed: std::time::Duration) -> String {
    let total_secs = elapsed.as_secs_f64();
    let hours = (total_secs / 3600.0) as u64;
    let minutes = ((total_secs % 3600.0) / 60.0) as u64;
    let seconds = total_secs % 60.0;

    if hours > 0 {
        format!("[Time used] {:02} h {:02} m {:06.3} s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("[Time used] {:02} m {:06.3} s", minutes, seconds)
    } else {
        format!("[Time used] {:.3} s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};
    use std::time::Duration;

    #[test]
    fn log_lines_are_timestamped() {
        let mut file = tempfile::tempfile().unwrap();
        {
            let mut logger = Logger::new(file.try_clone().unwrap());
            logger.log("clustered 3 rows").unwrap();
        }
        let mut contents = String::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_string(&mut contents).unwrap();
        assert!(contents.starts_with('['));
        assert!(contents.trim_end().ends_with("] clustered 3 rows"));
    }

    #[test]
    fn time_format() {
        assert_eq!(format_time_used(Duration::from_millis(1500)), "[Time used] 1.500 s");
        assert_eq!(format_time_used(Duration::from_secs(61)), "[Time used] 01 m 01.000 s");
        assert_eq!(
            format_time_used(Duration::from_secs(3723)),
            "[Time used] 01 h 02 m 03.000 s"
        );
    }
}
