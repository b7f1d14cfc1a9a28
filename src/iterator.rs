//! A minimal forward-iteration trait shared by in-memory and on-disk
//! sources of internal keys.

use crate::error::Result;

pub trait DBIterator {
    fn valid(&self) -> bool;
    fn seek_to_first(&mut self);
    fn seek_to_last(&mut self);
    fn seek(&mut self, target: &[u8]);
    fn next(&mut self);
    fn prev(&mut self);
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
    fn status(&self) -> Result<()>;
}

/// A `DBIterator` over an already-sorted, owned vector of entries. Used
/// wherever a collaborator (a memtable snapshot, a test fixture) needs to
/// hand repair a `Box<dyn DBIterator>` without repair caring what backs it.
pub struct VecIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
}

impl VecIterator {
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        VecIterator { entries, pos: None }
    }
}

impl DBIterator for VecIterator {
    fn valid(&self) -> bool {
        matches!(self.pos, Some(p) if p < self.entries.len())
    }

    fn seek_to_first(&mut self) {
        self.pos = if self.entries.is_empty() { None } else { Some(0) };
    }

    fn seek_to_last(&mut self) {
        self.pos = self.entries.len().checked_sub(1);
    }

    fn seek(&mut self, target: &[u8]) {
        self.pos = self.entries.iter().position(|e| e.0.as_slice() >= target);
    }

    fn next(&mut self) {
        self.pos = self.pos.map(|p| p + 1);
    }

    fn prev(&mut self) {
        self.pos = match self.pos {
            Some(0) | None => None,
            Some(p) => Some(p - 1),
        };
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos.expect("iterator not valid")].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos.expect("iterator not valid")].1
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
