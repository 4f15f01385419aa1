//! Tolerant parser for FTP `LIST` output.
//!
//! Servers disagree on listing formats; the two that matter in practice are
//! Unix `ls -l` style and Windows `DIR` style. Anything else (the `total N`
//! preamble, blank lines, exotic servers) is rejected per line and the
//! listing proceeds without it.

use chrono::{Datelike, Local, TimeZone};

use super::{FtpItem, ItemKind};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parses one listing line into an item, or rejects it.
#[must_use]
pub fn parse_line(line: &str) -> Option<FtpItem> {
    let line = line.trim_start().trim_end_matches('\r');
    match line.chars().next()? {
        'd' | '-' | 'l' => parse_unix(line),
        c if c.is_ascii_digit() => parse_windows(line),
        _ => None,
    }
}

/// `drwxr-xr-x 2 user group 4096 Jan  1 12:00 name`
/// `-rw-r--r-- 1 user group 1234 Jan  1 2023 name -> target`
fn parse_unix(line: &str) -> Option<FtpItem> {
    if line.len() < 10 {
        return None;
    }
    let (kind, mode) = match line.as_bytes()[0] {
        b'd' => (ItemKind::Directory, libc::S_IFDIR as u32 | 0o755),
        b'-' => (ItemKind::File, libc::S_IFREG as u32 | 0o644),
        b'l' => (ItemKind::Link, libc::S_IFLNK as u32 | 0o777),
        _ => return None,
    };

    let mut fields = Fields::new(line);
    // Permissions, link count, owner, group.
    for _ in 0..4 {
        fields.token()?;
    }
    let size: u64 = fields.token()?.parse().ok()?;

    let month_prefix = fields.token()?.get(..3)?;
    let month = MONTHS
        .iter()
        .position(|m| month_prefix.eq_ignore_ascii_case(m))?;
    let day: u32 = fields.token()?.parse().ok()?;

    let when = fields.token()?;
    let (year, hour, minute) = match when.split_once(':') {
        Some((h, m)) => (Local::now().year(), h.parse().ok()?, m.parse().ok()?),
        None => (when.parse().ok()?, 0, 0),
    };

    fields.skip_whitespace();
    let mut name = fields.remainder();
    if let Some(arrow) = name.find(" -> ") {
        name = &name[..arrow];
    }
    if name.is_empty() {
        return None;
    }

    Some(FtpItem {
        name: name.to_owned(),
        kind,
        size,
        mtime: local_timestamp(year, month as u32 + 1, day, hour, minute)?,
        mode,
    })
}

/// `01-01-24  12:00PM       <DIR>          Data`
/// `01-01-24  12:00PM              1234    file.txt`
fn parse_windows(line: &str) -> Option<FtpItem> {
    if line.len() < 20 {
        return None;
    }

    let mut fields = Fields::new(line);
    let date = fields.token()?;
    let mut parts = date.splitn(3, '-');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let mut year: i32 = parts.next()?.parse().ok()?;
    if year < 50 {
        year += 2000;
    } else if year < 100 {
        year += 1900;
    }

    let (hour, minute) = parse_clock(fields.token()?)?;

    let size_token = fields.token()?;
    let (kind, mode, size) = if size_token.eq_ignore_ascii_case("<DIR>") {
        (ItemKind::Directory, libc::S_IFDIR as u32 | 0o755, 0)
    } else {
        (
            ItemKind::File,
            libc::S_IFREG as u32 | 0o644,
            size_token.parse().ok()?,
        )
    };

    fields.skip_whitespace();
    let name = fields.remainder().trim_end();
    if name.is_empty() {
        return None;
    }

    Some(FtpItem {
        name: name.to_owned(),
        kind,
        size,
        mtime: local_timestamp(year, month, day, hour, minute)?,
        mode,
    })
}

/// `HH:MM`, `HH:MMAM`, or `HH:MMPM` (case-insensitive).
fn parse_clock(token: &str) -> Option<(u32, u32)> {
    let (h, rest) = token.split_once(':')?;
    let mut hour: u32 = h.parse().ok()?;
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let minute: u32 = rest.get(..digits)?.parse().ok()?;
    let suffix = &rest[digits..];
    if suffix.eq_ignore_ascii_case("pm") {
        if hour != 12 {
            hour += 12;
        }
    } else if suffix.eq_ignore_ascii_case("am") && hour == 12 {
        hour = 0;
    }
    Some((hour, minute))
}

/// Local-time calendar components to a Unix timestamp. A date that does not
/// exist in the local calendar rejects the line.
fn local_timestamp(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<i64> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Whitespace-delimited field scanner that can also yield the untokenized
/// remainder, which is where filenames with embedded spaces live.
struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    fn skip_whitespace(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn token(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(token)
    }

    fn remainder(&self) -> &'a str {
        self.rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
        local_timestamp(year, month, day, hour, minute).expect("valid test date")
    }

    #[test]
    fn unix_file_line() {
        let item = parse_line("-rw-r--r-- 1 user group 1234 Jan  1 12:00 file.txt").unwrap();
        assert_eq!(item.name, "file.txt");
        assert_eq!(item.kind, ItemKind::File);
        assert_eq!(item.size, 1234);
        assert_eq!(item.mode, libc::S_IFREG as u32 | 0o644);
        assert_eq!(item.mtime, expect_local(Local::now().year(), 1, 1, 12, 0));
    }

    #[test]
    fn unix_directory_line() {
        let item = parse_line("drwxr-xr-x 2 user group 4096 Mar 15 2023 src").unwrap();
        assert_eq!(item.kind, ItemKind::Directory);
        assert_eq!(item.mode, libc::S_IFDIR as u32 | 0o755);
        assert_eq!(item.size, 4096);
        assert_eq!(item.mtime, expect_local(2023, 3, 15, 0, 0));
    }

    #[test]
    fn unix_link_discards_target() {
        let item = parse_line("lrwxrwxrwx 1 u g 4 Jun  3 09:30 current -> v2.0").unwrap();
        assert_eq!(item.name, "current");
        assert_eq!(item.kind, ItemKind::Link);
        assert_eq!(item.mode, libc::S_IFLNK as u32 | 0o777);
    }

    #[test]
    fn unix_name_with_spaces_survives() {
        let item = parse_line("-rw-r--r-- 1 u g 9 Dec 24 23:59 my report.txt").unwrap();
        assert_eq!(item.name, "my report.txt");
    }

    #[test]
    fn unix_month_is_case_insensitive() {
        assert!(parse_line("-rw-r--r-- 1 u g 1 JAN 1 2020 a").is_some());
        assert!(parse_line("-rw-r--r-- 1 u g 1 dec 1 2020 a").is_some());
        assert!(parse_line("-rw-r--r-- 1 u g 1 Foo 1 2020 a").is_none());
    }

    #[test]
    fn unix_leading_whitespace_is_trimmed() {
        assert!(parse_line("   -rw-r--r-- 1 u g 1 Jan 1 2020 a").is_some());
    }

    #[test]
    fn windows_directory_line() {
        let item = parse_line("01-01-24  12:00PM       <DIR>          Data").unwrap();
        assert_eq!(item.name, "Data");
        assert_eq!(item.kind, ItemKind::Directory);
        assert_eq!(item.size, 0);
        assert_eq!(item.mtime, expect_local(2024, 1, 1, 12, 0));
    }

    #[test]
    fn windows_file_line() {
        let item = parse_line("03-20-99  02:15AM             4096    notes.txt").unwrap();
        assert_eq!(item.name, "notes.txt");
        assert_eq!(item.kind, ItemKind::File);
        assert_eq!(item.size, 4096);
        assert_eq!(item.mtime, expect_local(1999, 3, 20, 2, 15));
    }

    #[test]
    fn windows_pm_keeps_noon_and_am_wraps_midnight() {
        let noon = parse_line("01-01-24  12:00PM             1    a.txt").unwrap();
        assert_eq!(noon.mtime, expect_local(2024, 1, 1, 12, 0));
        let midnight = parse_line("01-01-24  12:00AM             1    a.txt").unwrap();
        assert_eq!(midnight.mtime, expect_local(2024, 1, 1, 0, 0));
        let evening = parse_line("01-01-24  11:30PM             1    a.txt").unwrap();
        assert_eq!(evening.mtime, expect_local(2024, 1, 1, 23, 30));
    }

    #[test]
    fn windows_four_digit_year_passes_through() {
        let item = parse_line("06-15-2023  08:05AM             12    a b.txt").unwrap();
        assert_eq!(item.name, "a b.txt");
        assert_eq!(item.mtime, expect_local(2023, 6, 15, 8, 5));
    }

    #[test]
    fn rejects_noise_lines() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("total 42").is_none());
        assert!(parse_line("-rw").is_none());
        assert!(parse_line("13-01-24").is_none());
    }

    #[test]
    fn strips_carriage_return() {
        let item = parse_line("-rw-r--r-- 1 u g 5 Jan 1 2020 a.txt\r").unwrap();
        assert_eq!(item.name, "a.txt");
    }

    #[test]
    fn invalid_calendar_date_rejects() {
        assert!(parse_line("13-32-24  12:00PM             1    a.txt").is_none());
    }
}
