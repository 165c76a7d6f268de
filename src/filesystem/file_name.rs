use std::{error::Error, ffi::OsString, fmt::Display};

use crate::config::FileNameEncoding;

/// The name an upload is stored under.
///
/// `display` is what the uploader sent (after sanitising) and is what goes back
/// over the wire. `encoded` is the same name re-encoded into the configured
/// byte encoding, and is the only form ever used to build a path, so every
/// fragment and the assembled file agree on the on-disk bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedName {
    display: String,
    encoded: OsString,
}

/// An error type representing an unusable upload file name.
#[derive(Debug, PartialEq)]
pub enum FileNameError {
    Empty,
    Unsafe(String),
}

impl Error for FileNameError {}

impl Display for FileNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "file name is empty"),
            Self::Unsafe(name) => write!(f, "unsafe file name: {name}"),
        }
    }
}

impl StagedName {
    /// Pick the upload's name: the declared `name` parameter, then the multipart
    /// file name, then a generated `file_<token>`.
    pub fn resolve(
        declared: Option<&str>,
        multipart_name: Option<&str>,
        encoding: FileNameEncoding,
    ) -> Result<Self, FileNameError> {
        let candidate = declared
            .filter(|name| !name.trim().is_empty())
            .or(multipart_name.filter(|name| !name.trim().is_empty()));

        let display = match candidate {
            Some(name) => sanitize(name)?,
            None => format!("file_{}", uuid::Uuid::new_v4().simple()),
        };

        Ok(Self::encode(display, encoding))
    }

    fn encode(display: String, encoding: FileNameEncoding) -> Self {
        let encoded = match encoding {
            FileNameEncoding::Utf8 => OsString::from(&display),
            FileNameEncoding::Gbk => gbk_os_string(&display),
        };
        Self { display, encoded }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn encoded(&self) -> &OsString {
        &self.encoded
    }

    /// On-disk name with `suffix` appended to the encoded bytes.
    pub fn with_suffix(&self, suffix: &str) -> OsString {
        let mut name = self.encoded.clone();
        name.push(suffix);
        name
    }
}

#[cfg(unix)]
fn gbk_os_string(name: &str) -> OsString {
    use std::os::unix::ffi::OsStringExt;

    // unmappable characters come back as numeric character references,
    // which is still deterministic
    let (bytes, _, _) = encoding_rs::GBK.encode(name);
    OsString::from_vec(bytes.into_owned())
}

#[cfg(not(unix))]
fn gbk_os_string(name: &str) -> OsString {
    // non-unix filesystems take unicode names only
    OsString::from(name)
}

/// Reduce a client supplied name to a bare file name.
fn sanitize(name: &str) -> Result<String, FileNameError> {
    let basename = name
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if basename.is_empty() {
        return Err(FileNameError::Empty);
    }
    if basename == "." || basename == ".." || basename.contains('\0') {
        return Err(FileNameError::Unsafe(name.to_string()));
    }

    Ok(basename.to_string())
}
