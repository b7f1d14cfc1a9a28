//! Filesystem abstraction. Repair only ever drives this through `Env`,
//! never `std::fs` directly, so tests can (in principle) swap in another
//! implementation.

pub mod posix;

use std::path::Path;

use crate::error::Result;

pub trait RandomAccessFile: Send + Sync {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()>;
}

pub trait WritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn sync(&mut self) -> Result<()>;
}

pub trait SequentialFile {
    /// Reads exactly `buf.len()` bytes, or returns an `io::ErrorKind::UnexpectedEof`
    /// wrapped `Error::IoError` if the file is exhausted first.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
    fn read_to_string(&mut self, buf: &mut String) -> Result<()>;
    /// Reads at most `buf.len()` bytes, returning the number actually read
    /// (0 at EOF). Used by the WAL reader, whose final on-disk block is
    /// often shorter than `BLOCK_SIZE`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// A filesystem environment. Mirrors the subset of operations the repair
/// entry point and its collaborators use: directory enumeration, file
/// rename/create/delete/size.
pub trait Env: Clone + Send + Sync + 'static {
    type RandomAccessFile: RandomAccessFile + 'static;
    type WritableFile: WritableFile + 'static;
    type SequentialFile: SequentialFile + 'static;

    fn new_random_access_file(&self, path: &Path) -> Result<Self::RandomAccessFile>;
    fn new_writable_file(&self, path: &Path) -> Result<Self::WritableFile>;
    fn new_sequential_file(&self, path: &Path) -> Result<Self::SequentialFile>;

    fn file_size(&self, path: &Path) -> Result<u64>;
    fn file_exists(&self, path: &Path) -> bool;

    fn delete_file(&self, path: &Path) -> Result<()>;
    fn rename_file(&self, from: &Path, to: &Path) -> Result<()>;

    fn create_dir_if_missing(&self, path: &Path) -> Result<()>;
    fn is_directory(&self, path: &Path) -> bool;
    /// Enumerates the immediate children of `path` by file name (no
    /// recursion). Returns `Error::NotFound` if `path` does not exist.
    fn get_children(&self, path: &Path) -> Result<Vec<String>>;
}

pub fn write_string_to_file<E: Env>(env: &E, data: &[u8], path: &Path, sync: bool) -> Result<()> {
    let do_write = || -> Result<()> {
        let mut file = env.new_writable_file(path)?;
        file.append(data)?;
        if sync {
            file.sync()?;
        } else {
            file.flush()?;
        }
        Ok(())
    };
    let result = do_write();
    if result.is_err() {
        let _ = env.delete_file(path);
    }
    result
}

pub fn read_file_to_string<E: Env>(env: &E, path: &Path) -> Result<String> {
    let mut file = env.new_sequential_file(path)?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    Ok(data)
}
