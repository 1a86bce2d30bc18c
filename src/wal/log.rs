use crate::error::{KvError, KvResult};
use crate::protocol::KvMessage;
use crate::tpc::TransactionDecision;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One line of the log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRecord {
    pub seq: u64,
    pub message: KvMessage,
}

/// A logged PUT/DEL request together with the decision logged after it, if
/// one arrived before the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedTransaction {
    /// Sequence number of the request record.
    pub seq: u64,
    pub request: KvMessage,
    pub decision: Option<TransactionDecision>,
}

impl LoggedTransaction {
    /// Records the first decision. A transaction is decided once; a later
    /// decision belongs to a transaction this replica never prepared and is
    /// ignored.
    fn decide(&mut self, seq: u64, decision: TransactionDecision) {
        match self.decision {
            None => self.decision = Some(decision),
            Some(existing) if existing == decision => {}
            Some(existing) => tracing::debug!(
                "Ignoring {} at seq {}, transaction at seq {} already decided {}",
                decision,
                seq,
                self.seq,
                existing
            ),
        }
    }
}

fn is_transaction_request(message: &KvMessage) -> bool {
    matches!(message, KvMessage::PutReq { .. } | KvMessage::DelReq { .. })
}

/// Folds records into transactions, in log order.
pub fn group_transactions(records: &[WalRecord]) -> Vec<LoggedTransaction> {
    let mut transactions: Vec<LoggedTransaction> = Vec::new();
    for record in records {
        if is_transaction_request(&record.message) {
            transactions.push(LoggedTransaction {
                seq: record.seq,
                request: record.message.clone(),
                decision: None,
            });
        } else if let Some(decision) = TransactionDecision::from_message(&record.message) {
            if let Some(current) = transactions.last_mut() {
                current.decide(record.seq, decision);
            }
        }
    }
    transactions
}

struct LogState {
    file: File,
    /// Bytes of complete records on disk.
    size: u64,
    next_seq: u64,
    records: usize,
    last: Option<WalRecord>,
    current: Option<LoggedTransaction>,
}

impl LogState {
    fn observe(&mut self, record: WalRecord) {
        self.next_seq = record.seq + 1;
        self.records += 1;

        if is_transaction_request(&record.message) {
            self.current = Some(LoggedTransaction {
                seq: record.seq,
                request: record.message.clone(),
                decision: None,
            });
        } else if let Some(decision) = TransactionDecision::from_message(&record.message) {
            if let Some(current) = self.current.as_mut() {
                current.decide(record.seq, decision);
            }
        }

        self.last = Some(record);
    }
}

/// Append-only transaction log for one replica.
///
/// Records are JSON lines. Every append is followed by `sync_data` before it
/// returns, so a record the caller has seen acknowledged survives a crash.
pub struct TpcLog {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl TpcLog {
    /// Opens or creates the log at `path`.
    ///
    /// A torn final line (crash mid-append) is truncated away. A bad record
    /// followed by further data is corruption and fails the open.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (records, valid_len) = read_records(&path)?;

        let file = open_for_append(&path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            tracing::warn!(
                "Truncating {} bytes of torn tail from {}",
                on_disk - valid_len,
                path.display()
            );
            file.set_len(valid_len)?;
            file.sync_data()?;
        }

        let mut state = LogState {
            file,
            size: valid_len,
            next_seq: 0,
            records: 0,
            last: None,
            current: None,
        };
        for record in records {
            state.observe(record);
        }

        tracing::info!(
            "Opened transaction log {} with {} records",
            path.display(),
            state.records
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Appends `message` and flushes it to stable storage. Returns the
    /// record's sequence number.
    pub fn append_and_flush(&self, message: &KvMessage) -> KvResult<u64> {
        let mut state = self.state.lock();
        let record = WalRecord {
            seq: state.next_seq,
            message: message.clone(),
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let file = &mut state.file;
        let written = file.write_all(&line).and_then(|_| file.sync_data());
        if let Err(e) = written {
            // Drop any partial line so the next append starts on a boundary.
            let size = state.size;
            let _ = state.file.set_len(size);
            tracing::error!("Failed to append to {}: {}", self.path.display(), e);
            return Err(e.into());
        }

        state.size += line.len() as u64;
        let seq = record.seq;
        state.observe(record);
        Ok(seq)
    }

    /// The most recently appended message.
    pub fn last_entry(&self) -> Option<KvMessage> {
        self.state.lock().last.as_ref().map(|record| record.message.clone())
    }

    /// The most recent PUT/DEL request and its logged decision, if any.
    pub fn last_transaction(&self) -> Option<LoggedTransaction> {
        self.state.lock().current.clone()
    }

    /// Every record currently on disk, in order.
    pub fn records(&self) -> KvResult<Vec<WalRecord>> {
        let _state = self.state.lock();
        let (records, _) = read_records(&self.path)?;
        Ok(records)
    }

    /// Every logged transaction, in order.
    pub fn transactions(&self) -> KvResult<Vec<LoggedTransaction>> {
        Ok(group_transactions(&self.records()?))
    }

    /// Sequence number the next append will get.
    pub fn next_seq(&self) -> u64 {
        self.state.lock().next_seq
    }

    pub fn len(&self) -> usize {
        self.state.lock().records
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops records older than `before_seq`, except that the latest
    /// transaction is always kept whole. Returns how many records went.
    ///
    /// Callers pass the `next_seq` observed before a store dump started, so
    /// every dropped record is already reflected in that dump.
    pub fn compact(&self, before_seq: u64) -> KvResult<usize> {
        let mut state = self.state.lock();
        let cut = match &state.current {
            Some(current) => before_seq.min(current.seq),
            None => before_seq,
        };

        let (records, _) = read_records(&self.path)?;
        let (dropped, kept): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|record| record.seq < cut);
        if dropped.is_empty() {
            return Ok(0);
        }

        let tmp = self.path.with_extension("wal.tmp");
        let mut out = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        let mut size = 0u64;
        for record in &kept {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            out.write_all(&line)?;
            size += line.len() as u64;
        }
        out.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        state.file = open_for_append(&self.path)?;
        state.size = size;
        state.records = kept.len();

        tracing::debug!(
            "Compacted {}: dropped {}, kept {}",
            self.path.display(),
            dropped.len(),
            kept.len()
        );
        Ok(dropped.len())
    }
}

fn open_for_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Reads every complete record. Returns them with the byte length of the
/// valid prefix.
fn read_records(path: &Path) -> KvResult<(Vec<WalRecord>, u64)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut valid_len = 0u64;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }
        // No newline means the process died mid-append.
        if line.last() != Some(&b'\n') {
            break;
        }

        match serde_json::from_slice::<WalRecord>(&line[..line.len() - 1]) {
            Ok(record) => {
                records.push(record);
                valid_len += read as u64;
            }
            Err(e) => {
                let mut rest = Vec::new();
                reader.read_until(b'\n', &mut rest)?;
                if rest.is_empty() {
                    break;
                }
                return Err(KvError::Storage(format!(
                    "corrupt record at byte {} of {}: {}",
                    valid_len,
                    path.display(),
                    e
                )));
            }
        }
    }

    Ok((records, valid_len))
}
