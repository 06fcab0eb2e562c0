//! File export of member addresses and comparison against a rule list file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::ExportError;
use crate::membership::{MemberRecord, normalize_email};
use crate::sync::diff::{SyncDiff, diff};
use crate::sync::report::render_diff;

/// `emails_<timestamp>.txt` in the working directory.
pub fn default_txt_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("emails_{}.txt", now.format("%Y%m%d_%H%M%S")))
}

/// `members_<timestamp>.csv` in the working directory.
pub fn default_csv_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("members_{}.csv", now.format("%Y%m%d_%H%M%S")))
}

/// Plain-text list: `#` header, blank line, one address per line, sorted.
pub fn render_email_list(emails: &BTreeSet<String>, now: DateTime<Local>) -> String {
    let mut out = format!(
        "# Member email export of {}\n\
         # Active members: {}\n\
         #\n\
         # Each of these addresses should have a forwarding rule.\n\
         #\n\n",
        now.format("%d.%m.%Y %H:%M"),
        emails.len()
    );
    for email in emails {
        out.push_str(email);
        out.push('\n');
    }
    out
}

pub async fn write_email_list(
    path: &Path,
    emails: &BTreeSet<String>,
    now: DateTime<Local>,
) -> Result<(), ExportError> {
    write_file(path, render_email_list(emails, now).into_bytes()).await?;
    tracing::info!(count = emails.len(), path = %path.display(), "Exported email addresses");
    Ok(())
}

/// `;`-delimited CSV with a header row, sorted by email.
pub fn render_member_csv(records: &[MemberRecord]) -> Result<Vec<u8>, ExportError> {
    let mut sorted: Vec<&MemberRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.email.cmp(&b.email));

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());
    for record in sorted {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Io {
            path: PathBuf::from("<csv buffer>"),
            source: e.into_error(),
        })
}

pub async fn write_member_csv(path: &Path, records: &[MemberRecord]) -> Result<(), ExportError> {
    write_file(path, render_member_csv(records)?).await?;
    tracing::info!(count = records.len(), path = %path.display(), "Exported member details");
    Ok(())
}

/// Parse a list of addresses, one per line. Blank lines, `#` comments and
/// lines without `@` are skipped.
pub fn parse_email_list(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(normalize_email)
        .filter(|line| !line.starts_with('#') && line.contains('@'))
        .collect()
}

pub async fn read_email_list(path: &Path) -> Result<BTreeSet<String>, ExportError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let emails = parse_email_list(&content);
    tracing::debug!(count = emails.len(), path = %path.display(), "Read email list");
    Ok(emails)
}

/// Diff the member addresses against the addresses listed in `path`.
pub async fn compare_with_file(
    desired: BTreeSet<String>,
    path: &Path,
) -> Result<SyncDiff, ExportError> {
    let listed = read_email_list(path).await?;
    Ok(diff(desired, listed))
}

pub fn render_compare_report(diff: &SyncDiff, path: &Path) -> String {
    let rule = "=".repeat(60);
    let mut out = format!("\n{rule}\nCOMPARE REPORT: members vs {}\n{rule}\n\n", path.display());
    render_diff(&mut out, diff, "Active members:", "Listed in file:");
    out.push_str(&format!("\n{rule}\n"));
    out
}

async fn write_file(path: &Path, bytes: Vec<u8>) -> Result<(), ExportError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 7, 14, 5, 9).unwrap()
    }

    fn emails(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn record(number: &str, email: &str) -> MemberRecord {
        MemberRecord {
            membership_number: number.into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: email.into(),
        }
    }

    #[test]
    fn test_default_names() {
        assert_eq!(
            default_txt_path(fixed_now()),
            PathBuf::from("emails_20250307_140509.txt")
        );
        assert_eq!(
            default_csv_path(fixed_now()),
            PathBuf::from("members_20250307_140509.csv")
        );
    }

    #[test]
    fn test_email_list_layout() {
        let emails = emails(&["b@x.com", "a@x.com"]);
        let text = render_email_list(&emails, fixed_now());
        assert!(text.starts_with("# Member email export of 07.03.2025 14:05\n"));
        assert!(text.contains("# Active members: 2\n"));
        assert!(text.ends_with("#\n\na@x.com\nb@x.com\n"));
    }

    #[test]
    fn test_csv_is_semicolon_delimited_and_sorted() {
        let bytes = render_member_csv(&[record("2", "z@x.com"), record("1", "a@x.com")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "membership_number;first_name;last_name;email");
        assert_eq!(lines[1], "1;Ada;Lovelace;a@x.com");
        assert_eq!(lines[2], "2;Ada;Lovelace;z@x.com");
    }

    #[test]
    fn test_parse_skips_comments_and_junk() {
        let parsed = parse_email_list(
            "# header\n\n  A@X.com \nnot an address\n#c@x.com\nb@x.com\na@x.com\n",
        );
        let expected = emails(&["a@x.com", "b@x.com"]);
        assert_eq!(parsed, expected);
    }

    #[tokio::test]
    async fn test_export_then_compare() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.txt");
        let exported = emails(&["a@x.com", "b@x.com"]);
        write_email_list(&path, &exported, fixed_now()).await.unwrap();

        let desired = emails(&["b@x.com", "c@x.com"]);
        let d = compare_with_file(desired, &path).await.unwrap();
        assert_eq!(d.to_add.iter().collect::<Vec<_>>(), vec!["c@x.com"]);
        assert_eq!(d.to_remove.iter().collect::<Vec<_>>(), vec!["a@x.com"]);

        let report = render_compare_report(&d, &path);
        assert!(report.contains("Listed in file:"));
        assert!(report.contains("   + c@x.com"));
    }

    #[tokio::test]
    async fn test_missing_compare_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_email_list(&dir.path().join("missing.txt")).await.unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }
}
