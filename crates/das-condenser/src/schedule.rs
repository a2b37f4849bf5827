//! Input file schedule.
//!
//! Acquisition systems write one file per minute, named after the UTC time the
//! recording started, e.g. `PSUDAS_UTC_20190426_205443.415.tdms`. A
//! [`FileSchedule`] describes a contiguous run of such files within one day
//! and expands to the ordered file names plus the start instant of each file.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A contiguous, inclusive run of per-minute files on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSchedule {
    /// Calendar year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Day of month, 1-31.
    pub day: u32,
    /// Hour of the first file (24 h clock).
    pub hour_start: u32,
    /// Minute of the first file.
    pub min_start: u32,
    /// Hour of the last file (inclusive).
    pub hour_end: u32,
    /// Minute of the last file (inclusive).
    pub min_end: u32,
    /// Text before the `YYYYMMDD_HHMM` stamp.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Text after the `YYYYMMDD_HHMM` stamp.
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Seconds of data in each file; must be a whole number of minutes.
    #[serde(default = "default_file_duration")]
    pub file_duration_secs: u32,
}

fn default_prefix() -> String {
    "PSUDAS_UTC_".to_owned()
}

fn default_suffix() -> String {
    "43.415.tdms".to_owned()
}

fn default_file_duration() -> u32 {
    60
}

impl Default for FileSchedule {
    fn default() -> Self {
        Self {
            year: 2019,
            month: 4,
            day: 26,
            hour_start: 20,
            min_start: 54,
            hour_end: 20,
            min_end: 58,
            prefix: default_prefix(),
            suffix: default_suffix(),
            file_duration_secs: default_file_duration(),
        }
    }
}

/// One expanded entry of a [`FileSchedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFile {
    /// File name (no directory).
    pub name: String,
    /// UTC instant at which the file's first window starts.
    pub start: DateTime<Utc>,
}

impl FileSchedule {
    /// Check that the schedule names a real, non-empty time range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file_duration_secs == 0 || self.file_duration_secs % 60 != 0 {
            return Err(ConfigError::invalid_value(
                "schedule.file_duration_secs",
                "must be a positive multiple of 60",
            ));
        }
        let start = self.instant(self.hour_start, self.min_start, "schedule start")?;
        let end = self.instant(self.hour_end, self.min_end, "schedule end")?;
        if end < start {
            return Err(ConfigError::invalid_value(
                "schedule",
                format!("end {end} precedes start {start}"),
            ));
        }
        Ok(())
    }

    /// Start instant of the first file.
    pub fn start(&self) -> Result<DateTime<Utc>, ConfigError> {
        self.instant(self.hour_start, self.min_start, "schedule start")
    }

    /// Length of one file.
    pub fn file_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.file_duration_secs))
    }

    /// Number of files in the schedule.
    pub fn num_files(&self) -> Result<usize, ConfigError> {
        Ok(self.files()?.len())
    }

    /// Expand to the ordered list of files, both ends inclusive.
    pub fn files(&self) -> Result<Vec<ScheduledFile>, ConfigError> {
        self.validate()?;
        let start = self.start()?;
        let end = self.instant(self.hour_end, self.min_end, "schedule end")?;
        let step = self.file_duration();

        let mut files = Vec::new();
        let mut current = start;
        while current <= end {
            files.push(ScheduledFile { name: self.file_name(current), start: current });
            current = current + step;
        }
        Ok(files)
    }

    /// Name of the file starting at `at`.
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!("{}{}{}", self.prefix, at.format("%Y%m%d_%H%M"), self.suffix)
    }

    fn instant(&self, hour: u32, minute: u32, what: &'static str) -> Result<DateTime<Utc>, ConfigError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or_else(|| {
                ConfigError::invalid_value(
                    what,
                    format!(
                        "{:04}-{:02}-{:02} {:02}:{:02} is not a valid UTC time",
                        self.year, self.month, self.day, hour, minute
                    ),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_names() {
        let files = FileSchedule::default().files().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "PSUDAS_UTC_20190426_205443.415.tdms",
                "PSUDAS_UTC_20190426_205543.415.tdms",
                "PSUDAS_UTC_20190426_205643.415.tdms",
                "PSUDAS_UTC_20190426_205743.415.tdms",
                "PSUDAS_UTC_20190426_205843.415.tdms",
            ]
        );
        assert_eq!(files[0].start.to_rfc3339(), "2019-04-26T20:54:00+00:00");
    }

    #[test]
    fn hour_rollover() {
        let schedule = FileSchedule {
            hour_start: 9,
            min_start: 58,
            hour_end: 10,
            min_end: 1,
            ..FileSchedule::default()
        };
        let names: Vec<String> = schedule.files().unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names.len(), 4);
        assert!(names[1].contains("_0959"));
        assert!(names[2].contains("_1000"));
        assert!(names[3].contains("_1001"));
    }

    #[test]
    fn single_file_schedule() {
        let schedule = FileSchedule { min_end: 54, ..FileSchedule::default() };
        assert_eq!(schedule.num_files().unwrap(), 1);
    }

    #[test]
    fn end_before_start_is_invalid() {
        let schedule = FileSchedule { hour_end: 19, ..FileSchedule::default() };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn impossible_date_is_invalid() {
        let schedule = FileSchedule { month: 2, day: 30, ..FileSchedule::default() };
        assert!(schedule.validate().is_err());
        let schedule = FileSchedule { min_start: 60, ..FileSchedule::default() };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn duration_must_be_whole_minutes() {
        let schedule = FileSchedule { file_duration_secs: 90, ..FileSchedule::default() };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn two_minute_files_skip_alternate_names() {
        let schedule = FileSchedule { file_duration_secs: 120, ..FileSchedule::default() };
        let files = schedule.files().unwrap();
        assert_eq!(files.len(), 3);
        assert!(files[1].name.contains("_2056"));
    }
}
