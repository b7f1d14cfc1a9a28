//! Opens and caches tables by file number. Repair only ever opens a given
//! table once during its scan, with a small capacity and no concurrent
//! readers, so a `RefCell`-guarded `lru::LruCache` is enough.

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;

use crate::env::Env;
use crate::error::Result;
use crate::filenames::{table_file_name, FileNum};
use crate::filter::FilterPolicy;
use crate::sstable::Table;

pub struct TableCache<E: Env> {
    env: E,
    lg_dir: PathBuf,
    filter_policy: Option<Arc<dyn FilterPolicy>>,
    cache: RefCell<LruCache<FileNum, Arc<Table>>>,
}

impl<E: Env> TableCache<E> {
    pub fn new(
        env: E,
        lg_dir: PathBuf,
        filter_policy: Option<Arc<dyn FilterPolicy>>,
        capacity: u64,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1) as usize).unwrap();
        TableCache {
            env,
            lg_dir,
            filter_policy,
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn find_table(&self, file_number: FileNum, file_size: u64) -> Result<Arc<Table>> {
        if let Some(table) = self.cache.borrow_mut().get(&file_number) {
            return Ok(table.clone());
        }

        let path = table_file_name(&self.lg_dir, file_number);
        let file = self.env.new_random_access_file(&path)?;
        let table = Arc::new(Table::open(&file, file_size, self.filter_policy.clone())?);
        self.cache.borrow_mut().put(file_number, table.clone());
        Ok(table)
    }

    pub fn evict(&self, file_number: FileNum) {
        self.cache.borrow_mut().pop(&file_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::posix::PosixEnv;
    use crate::sstable::TableBuilder;

    #[test]
    fn opens_and_reuses_cached_table() {
        let dir = tempfile::tempdir().unwrap();
        let env = PosixEnv;
        let path = table_file_name(dir.path(), 1);
        let file = env.new_writable_file(&path).unwrap();
        let mut builder = TableBuilder::new(file, None);
        builder.add(b"k", b"v");
        let size = builder.finish().unwrap();

        let cache = TableCache::new(env, dir.path().to_path_buf(), None, 4);
        let t1 = cache.find_table(1, size).unwrap();
        let t2 = cache.find_table(1, size).unwrap();
        assert!(Arc::ptr_eq(&t1, &t2));
    }
}
