//! Tree object
//!
//! A tree is an ordered list of `(name, mode, oid)` entries describing one
//! directory level. Subdirectories are nested trees referenced by oid.
//!
//! ## Wire format
//!
//! `tree <size>\0` followed by one `<octal mode> <name>\0<20-byte oid>` per
//! entry, names in ascending byte order.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use derive_new::new;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

/// One `(oid, mode)` slot inside a tree.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TreeEntry {
    pub oid: ObjectId,
    pub mode: EntryMode,
}

impl TreeEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    pub fn from_entries(entries: BTreeMap<String, TreeEntry>) -> Self {
        Tree { entries }
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: TreeEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &TreeEntry)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> BTreeMap<String, TreeEntry> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();
        for (name, entry) in &self.entries {
            let header = format!("{:o} {}", entry.mode.as_u32(), name);
            content_bytes.write_all(header.as_bytes())?;
            content_bytes.push(0);
            entry.oid.write_h40_to(&mut content_bytes)?;
        }

        let mut tree_bytes = Vec::new();
        let header = format!("{} {}\0", self.object_type().as_str(), content_bytes.len());
        tree_bytes.write_all(header.as_bytes())?;
        tree_bytes.write_all(&content_bytes)?;

        Ok(Bytes::from(tree_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = reader;

        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if *mode_bytes.last().unwrap() != b' ' {
                anyhow::bail!("unexpected EOF in tree entry mode");
            }
            mode_bytes.pop();

            let mode_str = std::str::from_utf8(&mode_bytes)?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            name_bytes.clear();
            let n = reader.read_until(b'\0', &mut name_bytes)?;
            if n == 0 || *name_bytes.last().unwrap() != b'\0' {
                anyhow::bail!("unexpected EOF in tree entry name");
            }
            name_bytes.pop();
            let name = std::str::from_utf8(&name_bytes)?.to_owned();

            let oid =
                ObjectId::read_h40_from(&mut reader).context("unexpected EOF in tree entry oid")?;

            entries.insert(name, TreeEntry::new(oid, mode));
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use std::io::Cursor;

    fn oid(fill: char) -> ObjectId {
        ObjectId::try_parse(fill.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn serializes_and_deserializes_entries_in_name_order() {
        let mut tree = Tree::default();
        tree.insert("zeta", TreeEntry::new(oid('a'), EntryMode::Directory));
        tree.insert(
            "alpha.txt",
            TreeEntry::new(oid('b'), EntryMode::File(FileMode::Regular)),
        );

        let bytes = tree.serialize().unwrap();
        let mut reader = Cursor::new(bytes);
        ObjectType::parse_object_type(&mut reader).unwrap();
        let parsed = Tree::deserialize(reader).unwrap();

        let names: Vec<_> = parsed.entries().map(|(name, _)| name.clone()).collect();
        pretty_assertions::assert_eq!(names, vec!["alpha.txt", "zeta"]);
        assert!(parsed.get("zeta").unwrap().is_tree());
        assert!(!parsed.get("alpha.txt").unwrap().is_tree());
    }

    #[test]
    fn tree_modes_survive_the_wire_format() {
        let mut tree = Tree::default();
        tree.insert(
            "run.sh",
            TreeEntry::new(oid('c'), EntryMode::File(FileMode::Executable)),
        );
        tree.insert("link", TreeEntry::new(oid('d'), EntryMode::Symlink));

        let bytes = tree.serialize().unwrap();
        let mut reader = Cursor::new(bytes);
        ObjectType::parse_object_type(&mut reader).unwrap();
        let parsed = Tree::deserialize(reader).unwrap();

        assert_eq!(
            parsed.get("run.sh").unwrap().mode,
            EntryMode::File(FileMode::Executable)
        );
        assert_eq!(parsed.get("link").unwrap().mode, EntryMode::Symlink);
    }
}
