//! Configuration store
//!
//! Dotted-key access over the git INI format at `<gitdir>/config`:
//! `branch.feature.remote` addresses `remote` inside `[branch "feature"]`.
//! Writes rewrite the file under an exclusive lock.

use anyhow::Context;
use derive_new::new;
use file_guard::Lock;
use std::io::Write;
use std::ops::DerefMut;
use std::path::Path;

#[derive(Debug, new)]
pub struct Config {
    path: Box<Path>,
}

/// A dotted key split into its section header and variable name.
#[derive(Debug, PartialEq, Eq)]
struct ConfigKey {
    header: String,
    name: String,
}

impl ConfigKey {
    fn parse(key: &str) -> anyhow::Result<Self> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            [section, name] => Ok(ConfigKey {
                header: format!("[{}]", section),
                name: name.to_string(),
            }),
            [section, middle @ .., name] if !middle.is_empty() => Ok(ConfigKey {
                header: format!("[{} \"{}\"]", section, middle.join(".")),
                name: name.to_string(),
            }),
            _ => anyhow::bail!("invalid config key: {key}"),
        }
    }
}

impl Config {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set a single dotted key, creating the section when absent.
    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let key = ConfigKey::parse(key)?;
        let mut lines = self.read_lines()?;

        let section_start = lines.iter().position(|line| line.trim() == key.header);

        match section_start {
            Some(start) => {
                let section_end = lines[start + 1..]
                    .iter()
                    .position(|line| line.trim_start().starts_with('['))
                    .map(|offset| start + 1 + offset)
                    .unwrap_or(lines.len());

                let existing = lines[start + 1..section_end].iter().position(|line| {
                    line.trim_start()
                        .split('=')
                        .next()
                        .is_some_and(|name| name.trim() == key.name)
                });

                let rendered = format!("\t{} = {}", key.name, value);
                match existing {
                    Some(offset) => lines[start + 1 + offset] = rendered,
                    None => lines.insert(section_end, rendered),
                }
            }
            None => {
                lines.push(key.header);
                lines.push(format!("\t{} = {}", key.name, value));
            }
        }

        self.write_lines(&lines)
    }

    /// Read a single dotted key back, if present.
    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let key = ConfigKey::parse(key)?;
        let lines = self.read_lines()?;

        let Some(start) = lines.iter().position(|line| line.trim() == key.header) else {
            return Ok(None);
        };

        for line in &lines[start + 1..] {
            if line.trim_start().starts_with('[') {
                break;
            }

            if let Some((name, value)) = line.split_once('=')
                && name.trim() == key.name
            {
                return Ok(Some(value.trim().to_string()));
            }
        }

        Ok(None)
    }

    fn read_lines(&self) -> anyhow::Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("unable to read config file {:?}", self.path))?;

        Ok(content.lines().map(str::to_string).collect())
    }

    fn write_lines(&self, lines: &[String]) -> anyhow::Result<()> {
        let mut config_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .with_context(|| format!("unable to open config file {:?}", self.path))?;
        let mut lock = file_guard::lock(&mut config_file, Lock::Exclusive, 0, 1)?;

        let mut content = lines.join("\n");
        content.push('\n');
        lock.deref_mut().write_all(content.as_bytes())?;

        Ok(())
    }
}
