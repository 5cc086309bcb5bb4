//! Entry modes
//!
//! The mode alphabet shared by trees, index entries, and workdir stats:
//! `100644` (regular file), `100755` (executable), `120000` (symbolic link),
//! `040000` (tree), `160000` (gitlink / submodule).
//!
//! Workdir modes obtained from `lstat` are normalized before any comparison:
//! a regular file is `100644` no matter its permission bits, anything with an
//! executable bit is `100755`, symlinks are `120000`, directories `040000`.
//! Only the normalized form is ever compared against tree or index modes.

/// Mode of a regular-file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    File(FileMode),
    Symlink,
    Directory,
    Gitlink,
}

impl Default for EntryMode {
    fn default() -> Self {
        EntryMode::File(FileMode::Regular)
    }
}

impl EntryMode {
    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::File(FileMode::Regular) => 0o100644,
            EntryMode::File(FileMode::Executable) => 0o100755,
            EntryMode::Symlink => 0o120000,
            EntryMode::Directory => 0o040000,
            EntryMode::Gitlink => 0o160000,
        }
    }

    /// Zero-padded octal form, as printed in tree listings.
    pub fn as_str(&self) -> &str {
        match self {
            EntryMode::File(FileMode::Regular) => "100644",
            EntryMode::File(FileMode::Executable) => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Directory => "040000",
            EntryMode::Gitlink => "160000",
        }
    }

    pub fn from_octal_str(value: &str) -> anyhow::Result<Self> {
        let raw = u32::from_str_radix(value, 8)
            .map_err(|_| anyhow::anyhow!("invalid octal entry mode: {value}"))?;
        Ok(raw.into())
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }

    pub fn is_gitlink(&self) -> bool {
        matches!(self, EntryMode::Gitlink)
    }
}

impl From<u32> for EntryMode {
    fn from(value: u32) -> Self {
        match value & 0o170000 {
            0o040000 => EntryMode::Directory,
            0o120000 => EntryMode::Symlink,
            0o160000 => EntryMode::Gitlink,
            _ => {
                if value & 0o111 != 0 {
                    EntryMode::File(FileMode::Executable)
                } else {
                    EntryMode::File(FileMode::Regular)
                }
            }
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
