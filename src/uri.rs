//! Resource URIs.
//!
//! A [`ResourceUri`] names an addressable byte source. The grammar is
//! deliberately small:
//!
//! ```text
//! URI = scheme ":" [ "//" hostname ] [ path ] [ "?" query ]
//! ```
//!
//! A missing scheme defaults to `file`, and opaque paths (no authority)
//! are stored verbatim. Local-path conversion handles both POSIX
//! absolute paths and Windows paths including UNC hosts, where a drive
//! letter is rewritten to its administrative share
//! (`C:` ↔ `C$`) whenever a hostname is present.

use crate::error::AppError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const FILE_SCHEME: &str = "file";

/// A structured resource URI with a canonical string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceUri {
    pub scheme: String,
    pub hostname: String,
    pub path: String,
    pub query: String,
}

impl ResourceUri {
    /// Build a `file` URI for a local path of the current platform.
    pub fn from_local_path(path: &Path) -> Self {
        #[cfg(windows)]
        {
            Self::from_windows_path(&path.to_string_lossy())
        }
        #[cfg(not(windows))]
        {
            Self::from_posix_path(&path.to_string_lossy())
        }
    }

    /// Render this URI as a local path of the current platform.
    pub fn to_local_path(&self) -> PathBuf {
        #[cfg(windows)]
        {
            PathBuf::from(self.windows_path())
        }
        #[cfg(not(windows))]
        {
            PathBuf::from(self.posix_path())
        }
    }

    /// `file:/absolute/path` → `/absolute/path`.
    pub fn posix_path(&self) -> String {
        self.path.clone()
    }

    /// `/absolute/path` → `file:/absolute/path`.
    pub fn from_posix_path(path: &str) -> Self {
        Self {
            scheme: FILE_SCHEME.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    /// Render as a Windows path, rewriting a drive letter to its
    /// administrative share when a hostname turns the result into a
    /// UNC path.
    pub fn windows_path(&self) -> String {
        let mut out = String::new();
        if !self.hostname.is_empty() {
            out.push_str("\\\\");
            out.push_str(&self.hostname);
            out.push('\\');
        }
        let mut parts: Vec<String> = self.path.split('/').skip(1).map(str::to_string).collect();
        if !self.hostname.is_empty() {
            if let Some(first) = parts.first_mut() {
                // rewrite drive letter to its administrative share
                if first.len() == 2 && first.as_bytes()[1] == b':' {
                    *first = format!("{}$", &first[..1]);
                }
            }
        }
        out.push_str(&parts.join("\\"));
        out
    }

    /// Parse a Windows path (drive-letter or UNC) into a `file` URI.
    /// An administrative share after a hostname is rewritten back to
    /// its drive letter.
    pub fn from_windows_path(path: &str) -> Self {
        let mut uri = Self {
            scheme: FILE_SCHEME.to_string(),
            ..Default::default()
        };
        let mut rest = path.to_string();
        if let Some(unc) = rest.strip_prefix("\\\\") {
            if let Some(sep) = unc.find('\\') {
                uri.hostname = unc[..sep].to_string();
                rest = unc[sep..].to_string();
                // \C$\... back to \C:\...
                let bytes = rest.as_bytes();
                if bytes.len() >= 3 && bytes[2] == b'$' {
                    rest = format!("{}:{}", &rest[..2], &rest[3..]);
                }
            }
        }
        uri.path = rest.replace('\\', "/");
        if !uri.path.starts_with('/') {
            uri.path = format!("/{}", uri.path);
        }
        uri
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if !self.hostname.is_empty() {
            write!(f, "//{}", self.hostname)?;
            if !self.path.is_empty() && !self.path.starts_with('/') {
                write!(f, "/")?;
            }
        }
        write!(f, "{}", self.path)?;
        if !self.query.is_empty() {
            if !self.query.starts_with('?') {
                write!(f, "?")?;
            }
            write!(f, "{}", self.query)?;
        }
        Ok(())
    }
}

impl FromStr for ResourceUri {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut uri = ResourceUri::default();
        let rest = match split_scheme(s) {
            Some((scheme, rest)) => {
                uri.scheme = scheme.to_ascii_lowercase();
                rest
            }
            None => {
                uri.scheme = FILE_SCHEME.to_string();
                s
            }
        };
        let rest = match rest.strip_prefix("//") {
            Some(after) => {
                let end = after
                    .find(|c| c == '/' || c == '?')
                    .unwrap_or(after.len());
                uri.hostname = after[..end].to_string();
                &after[end..]
            }
            None => rest,
        };
        match rest.split_once('?') {
            Some((path, query)) => {
                uri.path = path.to_string();
                uri.query = query.to_string();
            }
            None => uri.path = rest.to_string(),
        }
        Ok(uri)
    }
}

/// Split a leading `scheme ":"` off `s`, if the prefix before the first
/// colon is a well-formed scheme name.
fn split_scheme(s: &str) -> Option<(&str, &str)> {
    let colon = s.find(':')?;
    let scheme = &s[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some((scheme, &s[colon + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> ResourceUri {
        s.parse().unwrap()
    }

    #[test]
    fn opaque_path_round_trips() {
        let uri = parse("file:opaque.txt");
        assert_eq!(
            uri,
            ResourceUri {
                scheme: "file".into(),
                hostname: "".into(),
                path: "opaque.txt".into(),
                query: "".into(),
            }
        );
        assert_eq!(uri.to_string(), "file:opaque.txt");
    }

    #[test]
    fn hostname_and_path_round_trip() {
        let uri = parse("file://server/share/file.txt");
        assert_eq!(
            uri,
            ResourceUri {
                scheme: "file".into(),
                hostname: "server".into(),
                path: "/share/file.txt".into(),
                query: "".into(),
            }
        );
        assert_eq!(uri.to_string(), "file://server/share/file.txt");
    }

    #[test]
    fn missing_scheme_defaults_to_file() {
        let uri = parse("/var/log/syslog");
        assert_eq!(uri.scheme, "file");
        assert_eq!(uri.path, "/var/log/syslog");
    }

    #[test]
    fn query_is_split_and_restored() {
        let uri = parse("file:///data?recursive=1");
        assert_eq!(uri.query, "recursive=1");
        assert_eq!(uri.to_string(), "file:/data?recursive=1");
    }

    #[test]
    fn canonicalizer_inserts_slash_between_host_and_relative_path() {
        let uri = ResourceUri {
            scheme: "file".into(),
            hostname: "server".into(),
            path: "share".into(),
            query: "".into(),
        };
        assert_eq!(uri.to_string(), "file://server/share");
    }

    #[test]
    fn windows_drive_path_round_trips() {
        let uri = parse("file:///C:/Users/Sean/Downloads");
        assert_eq!(uri.windows_path(), r"C:\Users\Sean\Downloads");
        let back = ResourceUri::from_windows_path(r"C:\Users\Sean\Downloads");
        assert_eq!(back, uri);
    }

    #[test]
    fn windows_unc_path_uses_administrative_share() {
        let uri = parse("file://skillian-pc.paperless/C:/Users/Sean/Downloads");
        assert_eq!(
            uri.windows_path(),
            r"\\skillian-pc.paperless\C$\Users\Sean\Downloads"
        );
        let back =
            ResourceUri::from_windows_path(r"\\skillian-pc.paperless\C$\Users\Sean\Downloads");
        assert_eq!(back, uri);
    }

    #[test]
    fn posix_path_round_trips() {
        let uri = ResourceUri::from_posix_path("/var/tmp/file.bin");
        assert_eq!(uri.to_string(), "file:/var/tmp/file.bin");
        assert_eq!(uri.posix_path(), "/var/tmp/file.bin");
    }
}
