//! Write-ahead log reader/writer, with block layout and CRC32-via-`crc`
//! framing. The reader supports a checksum-disable + corruption-reporter
//! mode that repair uses so a single damaged record drops only itself
//! instead of aborting the whole log.

use crc::{Crc, CRC_32_ISCSI};

use crate::env::{SequentialFile, WritableFile};
use crate::error::{Error, Result};

const BLOCK_SIZE: usize = 32 * 1024;
const HEADER_SIZE: usize = 4 + 2 + 1;
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordType {
    Zero,
    Full,
    First,
    Middle,
    Last,
}

impl RecordType {
    fn to_u8(self) -> u8 {
        match self {
            RecordType::Zero => 0,
            RecordType::Full => 1,
            RecordType::First => 2,
            RecordType::Middle => 3,
            RecordType::Last => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => RecordType::Full,
            2 => RecordType::First,
            3 => RecordType::Middle,
            4 => RecordType::Last,
            _ => RecordType::Zero,
        }
    }
}

fn checksum(record_type: u8, data: &[u8]) -> u32 {
    let mut digest = CASTAGNOLI.digest();
    digest.update(&[record_type]);
    digest.update(data);
    digest.finalize()
}

pub struct LogWriter<W: WritableFile> {
    dst: W,
    block_offset: usize,
}

impl<W: WritableFile> LogWriter<W> {
    pub fn new(dst: W) -> Self {
        LogWriter {
            dst,
            block_offset: 0,
        }
    }

    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut data = data;
        let mut begin = true;

        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    self.dst.append(&vec![0u8; leftover])?;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_len = avail.min(data.len());
            let end = fragment_len == data.len();

            let record_type = if begin && end {
                RecordType::Full
            } else if begin {
                RecordType::First
            } else if end {
                RecordType::Last
            } else {
                RecordType::Middle
            };

            self.emit_record(record_type, &data[..fragment_len])?;
            data = &data[fragment_len..];
            begin = false;
            if data.is_empty() {
                break;
            }
        }
        Ok(())
    }

    fn emit_record(&mut self, record_type: RecordType, data: &[u8]) -> Result<()> {
        assert!(data.len() <= 0xffff);
        let crc = checksum(record_type.to_u8(), data);

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&crc.to_le_bytes());
        header.extend_from_slice(&(data.len() as u16).to_le_bytes());
        header.push(record_type.to_u8());

        self.dst.append(&header)?;
        self.dst.append(data)?;
        self.block_offset += HEADER_SIZE + data.len();
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.dst.flush()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.dst.sync()
    }
}

/// Sink for non-fatal WAL problems. Repair uses this to log-and-continue
/// instead of aborting replay: benign corruption is reported and skipped.
pub type Reporter<'a> = Box<dyn FnMut(usize, &Error) + 'a>;

pub struct LogReader<'a, S: SequentialFile> {
    file: S,
    reporter: Option<Reporter<'a>>,
    checksum: bool,
    buffer: Vec<u8>,
    buf_pos: usize,
    eof: bool,
    last_record_offset: u64,
    end_of_buffer_offset: u64,
}

impl<'a, S: SequentialFile> LogReader<'a, S> {
    /// `checksum`: verify each record's CRC32 and fail the whole read on
    /// mismatch. Repair runs with this off and a `reporter` instead, trading
    /// fidelity for yield.
    pub fn new(file: S, checksum: bool, reporter: Option<Reporter<'a>>) -> Self {
        LogReader {
            file,
            reporter,
            checksum,
            buffer: Vec::new(),
            buf_pos: 0,
            eof: false,
            last_record_offset: 0,
            end_of_buffer_offset: 0,
        }
    }

    fn report_drop(&mut self, bytes: usize, err: Error) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter(bytes, &err);
        }
    }

    fn fill_buffer(&mut self) -> Result<bool> {
        let mut block = vec![0u8; BLOCK_SIZE];
        let n = self.file.read(&mut block)?;
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        block.truncate(n);
        self.buffer = block;
        self.buf_pos = 0;
        Ok(true)
    }

    /// Reads one physical (possibly fragment) record. Returns `Ok(None)` at
    /// a clean end of file. A checksum mismatch or truncated header is
    /// reported and treated as EOF of the current block: the caller moves
    /// on to the next block rather than aborting.
    fn read_physical_record(&mut self) -> Result<Option<(RecordType, Vec<u8>)>> {
        loop {
            if self.buffer.len() - self.buf_pos < HEADER_SIZE {
                if !self.eof {
                    self.end_of_buffer_offset += self.buffer.len() as u64 - self.buf_pos as u64;
                    if !self.fill_buffer()? {
                        return Ok(None);
                    }
                    continue;
                }
                if self.buffer.len() != self.buf_pos {
                    self.report_drop(
                        self.buffer.len() - self.buf_pos,
                        Error::Corruption("truncated record header at end of file".into()),
                    );
                }
                return Ok(None);
            }

            let header = &self.buffer[self.buf_pos..self.buf_pos + HEADER_SIZE];
            let expected_crc = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let length = u16::from_le_bytes(header[4..6].try_into().unwrap()) as usize;
            let record_type = RecordType::from_u8(header[6]);

            if self.buf_pos + HEADER_SIZE + length > self.buffer.len() {
                let drop_size = self.buffer.len() - self.buf_pos;
                self.buf_pos = self.buffer.len();
                if !self.eof {
                    self.report_drop(
                        drop_size,
                        Error::Corruption("record length exceeds block".into()),
                    );
                    continue;
                }
                self.report_drop(
                    drop_size,
                    Error::Corruption("truncated record at end of file".into()),
                );
                return Ok(None);
            }

            if record_type == RecordType::Zero && length == 0 {
                // Trailing zero padding at the end of a block; skip to next.
                self.buf_pos = self.buffer.len();
                continue;
            }

            let data_start = self.buf_pos + HEADER_SIZE;
            let data_end = data_start + length;
            let data = self.buffer[data_start..data_end].to_vec();

            if self.checksum {
                let actual_crc = checksum(header[6], &data);
                if actual_crc != expected_crc {
                    let drop_size = data_end - self.buf_pos;
                    self.buf_pos = data_end;
                    self.report_drop(drop_size, Error::Corruption("checksum mismatch".into()));
                    continue;
                }
            }

            self.buf_pos = data_end;
            return Ok(Some((record_type, data)));
        }
    }

    /// Reassembles and returns the next logical record, or `None` at clean
    /// EOF. The byte offset of the most recently returned record (from the
    /// start of the file) is available via `last_record_offset`.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut in_fragmented_record = false;
        let mut scratch: Vec<u8> = Vec::new();

        loop {
            match self.read_physical_record()? {
                None => return Ok(None),
                Some((record_type, data)) => match record_type {
                    RecordType::Full => {
                        if in_fragmented_record && !scratch.is_empty() {
                            self.report_drop(
                                scratch.len(),
                                Error::Corruption("partial record without end".into()),
                            );
                        }
                        self.last_record_offset = self.end_of_buffer_offset
                            + self.buf_pos as u64
                            - data.len() as u64
                            - HEADER_SIZE as u64;
                        return Ok(Some(data));
                    }
                    RecordType::First => {
                        if in_fragmented_record && !scratch.is_empty() {
                            self.report_drop(
                                scratch.len(),
                                Error::Corruption("partial record without end".into()),
                            );
                        }
                        scratch = data;
                        in_fragmented_record = true;
                    }
                    RecordType::Middle => {
                        if !in_fragmented_record {
                            self.report_drop(
                                data.len(),
                                Error::Corruption("missing start of fragmented record".into()),
                            );
                        } else {
                            scratch.extend_from_slice(&data);
                        }
                    }
                    RecordType::Last => {
                        if !in_fragmented_record {
                            self.report_drop(
                                data.len(),
                                Error::Corruption("missing start of fragmented record".into()),
                            );
                        } else {
                            scratch.extend_from_slice(&data);
                            return Ok(Some(scratch));
                        }
                    }
                    RecordType::Zero => {}
                },
            }
        }
    }

    pub fn last_record_offset(&self) -> u64 {
        self.last_record_offset
    }
}
