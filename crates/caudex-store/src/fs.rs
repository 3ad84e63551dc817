use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use caudex_hash::Digest;

use crate::{io_error, Reduction, RevRecords, StoreError, StoreReader, StoreResult, StoreWriter};

const RECORD_LOG: &str = "records.log";
const REDUCTIONS_DIR: &str = "reductions";

/// Filesystem-backed store.
///
/// Composition records live in a single append-only `records.log` of
/// length-prefixed entries (u32 LE length, then the payload), fsynced on
/// every append. Reductions live one file per digest under `reductions/`,
/// written via a temp file and an atomic rename so an overwrite is never
/// observed torn.
///
/// A truncated trailing entry in the log means the append never returned;
/// it is skipped on read with a warning. Truncation cannot occur anywhere
/// but the tail with this framing.
#[derive(Debug, Clone)]
pub struct FsStore {
    log_path: PathBuf,
    reductions_dir: PathBuf,
}

impl FsStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        let reductions_dir = root.join(REDUCTIONS_DIR);
        fs::create_dir_all(&reductions_dir).map_err(|e| io_error(&reductions_dir, e))?;
        let log_path = root.join(RECORD_LOG);
        if !log_path.exists() {
            File::create(&log_path).map_err(|e| io_error(&log_path, e))?;
        }
        Ok(Self {
            log_path,
            reductions_dir,
        })
    }

    fn reduction_path(&self, hash: &Digest) -> PathBuf {
        self.reductions_dir
            .join(format!("{}.json", hex::encode(hash.as_bytes())))
    }

    fn read_all_records(&self) -> StoreResult<Vec<Vec<u8>>> {
        let mut file = File::open(&self.log_path).map_err(|e| io_error(&self.log_path, e))?;
        let mut entries = Vec::new();
        let mut offset: u64 = 0;
        loop {
            let mut len_buf = [0u8; 4];
            let read = read_up_to(&mut file, &mut len_buf).map_err(|e| io_error(&self.log_path, e))?;
            if read == 0 {
                break;
            }
            if read < len_buf.len() {
                log::warn!(
                    "skipping truncated length header at byte {offset} of {:?}",
                    self.log_path
                );
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            match file.read_exact(&mut buf) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                    log::warn!(
                        "skipping truncated record payload at byte {offset} of {:?}",
                        self.log_path
                    );
                    break;
                }
                Err(err) => return Err(io_error(&self.log_path, err)),
            }
            offset += 4 + len as u64;
            entries.push(buf);
        }
        Ok(entries)
    }
}

impl StoreWriter for FsStore {
    fn append_record(&mut self, bytes: &[u8]) -> StoreResult<()> {
        let len = bytes.len();
        if len > u32::MAX as usize {
            return Err(StoreError::Corrupt("record larger than 4GiB".into()));
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.log_path)
            .map_err(|e| io_error(&self.log_path, e))?;
        file.write_all(&(len as u32).to_le_bytes())
            .map_err(|e| io_error(&self.log_path, e))?;
        file.write_all(bytes)
            .map_err(|e| io_error(&self.log_path, e))?;
        file.sync_all().map_err(|e| io_error(&self.log_path, e))?;
        Ok(())
    }

    fn put_reduction(&mut self, reduction: &Reduction) -> StoreResult<()> {
        let bytes = serde_json::to_vec(reduction)?;
        let path = self.reduction_path(&reduction.reduced_composition_hash);
        let tmp = self.reductions_dir.join(format!(
            ".tmp-{}",
            hex::encode(reduction.reduced_composition_hash.as_bytes())
        ));
        let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        Ok(())
    }
}

impl StoreReader for FsStore {
    fn records_rev(&self) -> StoreResult<RevRecords<'_>> {
        let entries = self.read_all_records()?;
        Ok(RevRecords::new(entries.into_iter().rev().map(Ok)))
    }

    fn reduction(&self, hash: Digest) -> StoreResult<Option<Reduction>> {
        let path = self.reduction_path(&hash);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path, err)),
        };
        let reduction: Reduction = serde_json::from_slice(&bytes)?;
        if reduction.reduced_composition_hash != hash {
            return Err(StoreError::Corrupt(format!(
                "reduction at {path:?} is keyed by {}",
                reduction.reduced_composition_hash
            )));
        }
        Ok(Some(reduction))
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
