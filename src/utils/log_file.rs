//! Dated log files kept alongside the terminal output.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};

const FILE_PREFIX: &str = "roomsort";

/// `<dir>/roomsort_YYYY-MM-DD.log` for `day`.
pub fn log_file_path(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}_{}.log", day.format("%Y-%m-%d")))
}

/// Appends to the log file for the current local day and moves on to the
/// next day's file at midnight. Old files are left for the operator.
pub struct DailyLogFile {
    dir: PathBuf,
    day: NaiveDate,
    file: File,
}

impl DailyLogFile {
    pub fn open(dir: PathBuf) -> io::Result<Self> {
        Self::open_for(dir, Local::now().date_naive())
    }

    pub fn open_for(dir: PathBuf, day: NaiveDate) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let file = open_append(&log_file_path(&dir, day))?;
        Ok(Self { dir, day, file })
    }

    pub fn current_path(&self) -> PathBuf {
        log_file_path(&self.dir, self.day)
    }

    /// Switches to the file for `day` unless it is already open.
    pub fn roll_to(&mut self, day: NaiveDate) -> io::Result<()> {
        if day == self.day {
            return Ok(());
        }
        let _ = self.file.flush();
        self.file = open_append(&log_file_path(&self.dir, day))?;
        self.day = day;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for DailyLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.roll_to(Local::now().date_naive())?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Copies every formatted record to stderr and to `file`. A broken file
/// never costs the terminal copy; its first failure is reported once on
/// stderr.
pub struct TeeWriter<W> {
    file: W,
    file_failing: bool,
}

impl<W: Write> TeeWriter<W> {
    pub fn new(file: W) -> Self {
        Self {
            file,
            file_failing: false,
        }
    }
}

impl<W: Write> Write for TeeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        match self.file.write_all(buf) {
            Ok(()) => self.file_failing = false,
            Err(err) if !self.file_failing => {
                self.file_failing = true;
                let _ = writeln!(io::stderr(), "log file write failed: {err}");
            }
            Err(_) => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        let _ = self.file.flush();
        Ok(())
    }
}
