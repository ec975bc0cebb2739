use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Leading bytes of every reservation journal: magic, then a little-endian
/// format version.
const MAGIC: [u8; 4] = *b"TSJ1";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: u64 = 6;

/// Largest payload a record may declare. Anything bigger is a corrupt length.
const MAX_RECORD_LEN: u32 = 1 << 20;

/// Bytes framing one record: length prefix and trailing crc32.
const FRAME_LEN: u64 = 8;

/// Why replay stopped before the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TailDamage {
    #[error("torn length prefix")]
    TornLength,
    #[error("torn record body")]
    TornRecord,
    #[error("record declares {0} bytes")]
    Oversized(u32),
    #[error("checksum mismatch")]
    Checksum,
    #[error("record does not decode as a journal event")]
    Undecodable,
}

/// What a journal read recovered.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Length of the intact prefix: header plus every whole record.
    pub valid_len: u64,
    /// Set when trailing bytes were discarded; `valid_len` is where they start.
    pub damage: Option<TailDamage>,
}

fn header() -> [u8; HEADER_LEN as usize] {
    let mut h = [0u8; HEADER_LEN as usize];
    h[..4].copy_from_slice(&MAGIC);
    h[4..].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    h
}

/// Fill `buf` as far as the reader allows. Returns the bytes read before EOF.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

enum Record {
    End,
    Event { event: Event, len: u64 },
    Damaged(TailDamage),
}

fn read_record(reader: &mut impl Read) -> io::Result<Record> {
    let mut len_buf = [0u8; 4];
    match fill(reader, &mut len_buf)? {
        0 => return Ok(Record::End),
        4 => {}
        _ => return Ok(Record::Damaged(TailDamage::TornLength)),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_RECORD_LEN {
        return Ok(Record::Damaged(TailDamage::Oversized(len)));
    }

    let mut payload = vec![0u8; len as usize];
    let mut crc_buf = [0u8; 4];
    if fill(reader, &mut payload)? < payload.len() || fill(reader, &mut crc_buf)? < 4 {
        return Ok(Record::Damaged(TailDamage::TornRecord));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Record::Damaged(TailDamage::Checksum));
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Record::Event {
            event,
            len: FRAME_LEN + u64::from(len),
        }),
        Err(_) => Ok(Record::Damaged(TailDamage::Undecodable)),
    }
}

fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_RECORD_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "journal record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// The reservation journal.
///
/// Layout: a 6-byte header (`TSJ1` + u16 version), then records of
/// `[u32 len][bincode Event][u32 crc32(payload)]`. Opening a journal cuts
/// off any damaged tail so later appends stay reachable on the next replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Read the journal at `path`, repair its tail, and open it for appends.
    pub fn open(path: &Path) -> io::Result<(Self, Replay)> {
        let replay = Self::read(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        if replay.valid_len == 0 {
            // New file, or one that died before its header was complete.
            file.set_len(0)?;
            (&file).write_all(&header())?;
            file.sync_all()?;
        } else if let Some(damage) = replay.damage {
            let on_disk = file.metadata()?.len();
            tracing::warn!(
                path = %path.display(),
                %damage,
                kept = replay.valid_len,
                discarded = on_disk.saturating_sub(replay.valid_len),
                "journal tail damaged, truncating"
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }

        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        };
        Ok((wal, replay))
    }

    /// Decode every intact record. A missing or empty file reads as empty; a
    /// file that is not a journal of a known version is an error.
    pub fn read(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);

        let mut head = [0u8; HEADER_LEN as usize];
        if fill(&mut reader, &mut head)? < head.len() {
            return Ok(Replay::default());
        }
        if head[..4] != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a reservation journal", path.display()),
            ));
        }
        let version = u16::from_le_bytes([head[4], head[5]]);
        if version != FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported journal version {version}"),
            ));
        }

        let mut replay = Replay {
            valid_len: HEADER_LEN,
            ..Replay::default()
        };
        loop {
            match read_record(&mut reader)? {
                Record::End => break,
                Record::Event { event, len } => {
                    replay.events.push(event);
                    replay.valid_len += len;
                }
                Record::Damaged(damage) => {
                    replay.damage = Some(damage);
                    break;
                }
            }
        }
        Ok(replay)
    }

    /// Buffer one event. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush buffered records and fsync.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a complete replacement journal next to `path` and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        writer.write_all(&header())?;
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Move the replacement over the journal and continue appending to it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}
