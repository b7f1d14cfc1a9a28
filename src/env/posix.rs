use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

use crate::error::{Error, Result};

use super::{Env, RandomAccessFile, SequentialFile, WritableFile};

pub struct PosixRandomAccessFile(File);

impl RandomAccessFile for PosixRandomAccessFile {
    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.0.read_exact_at(buf, offset)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = self.0.try_clone()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}

pub struct PosixWritableFile(File);

impl WritableFile for PosixWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.0.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.0.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.0.sync_all()?;
        Ok(())
    }
}

pub struct PosixSequentialFile(File);

impl SequentialFile for PosixSequentialFile {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.0.read_exact(buf).map_err(Error::from)
    }

    fn read_to_string(&mut self, buf: &mut String) -> Result<()> {
        self.0.read_to_string(buf)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(Read::read(&mut self.0, buf)?)
    }
}

/// The real, on-disk filesystem. The only `Env` implementation this crate
/// ships: repair is meant to run against a quiescent, real database
/// directory, and tests exercise it against real `tempfile` directories
/// rather than a mocked filesystem (see DESIGN.md).
#[derive(Clone, Copy, Debug, Default)]
pub struct PosixEnv;

impl Env for PosixEnv {
    type RandomAccessFile = PosixRandomAccessFile;
    type WritableFile = PosixWritableFile;
    type SequentialFile = PosixSequentialFile;

    fn new_random_access_file(&self, path: &Path) -> Result<Self::RandomAccessFile> {
        Ok(PosixRandomAccessFile(
            OpenOptions::new().read(true).open(path)?,
        ))
    }

    fn new_writable_file(&self, path: &Path) -> Result<Self::WritableFile> {
        Ok(PosixWritableFile(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?,
        ))
    }

    fn new_sequential_file(&self, path: &Path) -> Result<Self::SequentialFile> {
        Ok(PosixSequentialFile(
            OpenOptions::new().read(true).open(path)?,
        ))
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn create_dir_if_missing(&self, path: &Path) -> Result<()> {
        match fs::create_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn get_children(&self, path: &Path) -> Result<Vec<String>> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "directory {} does not exist",
                path.display()
            )));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        let env = PosixEnv;

        let mut file = env.new_writable_file(&path).unwrap();
        file.append(b"hello world").unwrap();
        file.sync().unwrap();

        assert!(env.file_exists(&path));
        assert_eq!(env.file_size(&path).unwrap(), 11);

        let mut reader = env.new_sequential_file(&path).unwrap();
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn get_children_lists_files() {
        let dir = tempfile::tempdir().unwrap();
        let env = PosixEnv;
        for name in ["a", "b", "c"] {
            env.new_writable_file(&dir.path().join(name)).unwrap();
        }
        let mut children = env.get_children(dir.path()).unwrap();
        children.sort();
        assert_eq!(children, vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let env = PosixEnv;
        let err = env.get_children(Path::new("/does/not/exist")).unwrap_err();
        assert!(err.is_not_found());
    }
}
