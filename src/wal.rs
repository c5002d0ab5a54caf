use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event to [len][bincode][crc32] format. Returns the bytes written.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(8 + payload.len() as u64)
}

/// Result of reading a log back from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// True if a truncated or corrupt tail was dropped.
    pub discarded_tail: bool,
    /// Byte length of the intact prefix: the offset just past the last good entry.
    pub valid_len: u64,
}

/// Append-only Write-Ahead Log holding every equipment and reservation change.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A truncated last entry (crash mid-write) is discarded on replay and cut
///   off with `truncate` before the log is reopened for appends.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length covered by the last successful `flush_sync`.
    synced_len: u64,
    /// Bytes and entries buffered since then.
    pending_len: u64,
    pending_appends: u64,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            synced_len,
            pending_len: 0,
            pending_appends: 0,
            appends_since_compact: 0,
        })
    }

    /// Cut the file at `path` down to `len` bytes and sync it.
    pub fn truncate(path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without syncing. `flush_sync()` commits the batch.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        let written = encode_event(&mut self.writer, event)?;
        self.pending_len += written;
        self.pending_appends += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.synced_len += self.pending_len;
        self.appends_since_compact += self.pending_appends;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    /// Throw away everything since the last successful `flush_sync`, both
    /// the buffered bytes and any that already reached the file.
    pub fn rollback(&mut self) -> io::Result<()> {
        let fresh = OpenOptions::new().append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(fresh));
        // into_parts hands back the file without flushing the buffer.
        let (file, _discarded) = stale.into_parts();
        self.pending_len = 0;
        self.pending_appends = 0;
        file.set_len(self.synced_len)?;
        file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write compacted events to a temp file beside the log and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<u64> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let mut len = 0;
        for event in events {
            len += encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(len)
    }

    /// Rename the temp file over the log and reopen it for appends.
    /// `len` is what `write_compact_file` returned.
    pub fn swap_compact_file(&mut self, len: u64) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.synced_len = len;
        self.pending_len = 0;
        self.pending_appends = 0;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let len = Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file(len)
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the log from disk. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            match read_or_eof(&mut reader, &mut len_buf)? {
                Chunk::Full => {}
                Chunk::Empty => break,
                Chunk::Partial => {
                    replay.discarded_tail = true;
                    break;
                }
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !matches!(read_or_eof(&mut reader, &mut payload)?, Chunk::Full)
                || !matches!(read_or_eof(&mut reader, &mut crc_buf)?, Chunk::Full)
            {
                replay.discarded_tail = true;
                break;
            }

            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                replay.discarded_tail = true;
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => {
                    replay.events.push(event);
                    replay.valid_len += 8 + len as u64;
                }
                Err(_) => {
                    replay.discarded_tail = true;
                    break;
                }
            }
        }

        Ok(replay)
    }
}

enum Chunk {
    Full,
    Empty,
    Partial,
}

/// Fill `buf` completely, or report whether the file ended before or inside it.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Chunk> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(match filled {
        n if n == buf.len() => Chunk::Full,
        0 => Chunk::Empty,
        _ => Chunk::Partial,
    })
}
