//! Write-Ahead Log Tests
//!
//! ## Test Scopes
//! - **Append**: records survive reopen, sequence numbers keep counting.
//! - **Transactions**: the latest request and its decision are tracked.
//! - **Crash tails**: torn final lines are dropped, mid-file corruption is not.
//! - **Compaction**: old records go, the latest transaction stays.

#[cfg(test)]
mod tests {
    use crate::protocol::KvMessage;
    use crate::tpc::TransactionDecision;
    use crate::wal::{LoggedTransaction, TpcLog};
    use std::io::Write;

    fn put(key: &str, value: &str) -> KvMessage {
        KvMessage::PutReq {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn del(key: &str) -> KvMessage {
        KvMessage::DelReq {
            key: key.to_string(),
        }
    }

    fn abort() -> KvMessage {
        KvMessage::Abort { message: None }
    }

    // ============================================================
    // APPEND
    // ============================================================

    #[test]
    fn test_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = TpcLog::open(dir.path().join("replica.wal")).unwrap();

        assert!(log.is_empty());
        assert_eq!(log.last_entry(), None);
        assert_eq!(log.last_transaction(), None);
        assert_eq!(log.next_seq(), 0);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.wal");

        {
            let log = TpcLog::open(&path).unwrap();
            assert_eq!(log.append_and_flush(&put("foo", "bar")).unwrap(), 0);
            assert_eq!(log.append_and_flush(&KvMessage::Commit).unwrap(), 1);
        }

        let log = TpcLog::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_entry(), Some(KvMessage::Commit));
        assert_eq!(log.append_and_flush(&del("foo")).unwrap(), 2);

        let records = log.records().unwrap();
        let seqs: Vec<u64> = records.iter().map(|record| record.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    // ============================================================
    // TRANSACTIONS
    // ============================================================

    #[test]
    fn test_last_transaction_skips_reads_and_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let log = TpcLog::open(dir.path().join("replica.wal")).unwrap();

        log.append_and_flush(&put("foo", "bar")).unwrap();
        log.append_and_flush(&KvMessage::GetReq {
            key: "other".to_string(),
        })
        .unwrap();

        assert_eq!(
            log.last_transaction(),
            Some(LoggedTransaction {
                seq: 0,
                request: put("foo", "bar"),
                decision: None,
            })
        );

        log.append_and_flush(&KvMessage::Commit).unwrap();
        let current = log.last_transaction().unwrap();
        assert_eq!(current.request, put("foo", "bar"));
        assert_eq!(current.decision, Some(TransactionDecision::Commit));
    }

    #[test]
    fn test_new_request_supersedes_previous() {
        let dir = tempfile::tempdir().unwrap();
        let log = TpcLog::open(dir.path().join("replica.wal")).unwrap();

        log.append_and_flush(&put("a", "1")).unwrap();
        log.append_and_flush(&KvMessage::Commit).unwrap();
        log.append_and_flush(&del("a")).unwrap();

        let current = log.last_transaction().unwrap();
        assert_eq!(current.request, del("a"));
        assert_eq!(current.decision, None);
    }

    #[test]
    fn test_transactions_group_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = TpcLog::open(dir.path().join("replica.wal")).unwrap();

        for message in [
            put("a", "1"),
            KvMessage::Commit,
            put("b", "2"),
            abort(),
            del("a"),
        ] {
            log.append_and_flush(&message).unwrap();
        }

        let decisions: Vec<_> = log
            .transactions()
            .unwrap()
            .into_iter()
            .map(|txn| (txn.request, txn.decision))
            .collect();
        assert_eq!(
            decisions,
            vec![
                (put("a", "1"), Some(TransactionDecision::Commit)),
                (put("b", "2"), Some(TransactionDecision::Abort)),
                (del("a"), None),
            ]
        );
    }

    #[test]
    fn test_first_decision_sticks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.wal");

        {
            let log = TpcLog::open(&path).unwrap();
            for message in [put("a", "1"), KvMessage::Commit, abort(), KvMessage::Commit] {
                log.append_and_flush(&message).unwrap();
            }
            let current = log.last_transaction().unwrap();
            assert_eq!(current.decision, Some(TransactionDecision::Commit));
        }

        let log = TpcLog::open(&path).unwrap();
        assert_eq!(
            log.last_transaction().unwrap().decision,
            Some(TransactionDecision::Commit)
        );
        let transactions = log.transactions().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].decision, Some(TransactionDecision::Commit));
    }

    // ============================================================
    // CRASH TAILS
    // ============================================================

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.wal");

        {
            let log = TpcLog::open(&path).unwrap();
            log.append_and_flush(&put("foo", "bar")).unwrap();
        }
        let intact = std::fs::metadata(&path).unwrap().len();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"seq":1,"message":{"Put"#).unwrap();
        drop(file);

        let log = TpcLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact);

        // Appends continue cleanly after the cut.
        log.append_and_flush(&KvMessage::Commit).unwrap();
        drop(log);
        let log = TpcLog::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(
            log.last_transaction().unwrap().decision,
            Some(TransactionDecision::Commit)
        );
    }

    #[test]
    fn test_garbage_final_line_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.wal");

        {
            let log = TpcLog::open(&path).unwrap();
            log.append_and_flush(&put("foo", "bar")).unwrap();
        }
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"not json\n").unwrap();
        drop(file);

        let log = TpcLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_mid_file_corruption_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.wal");

        {
            let log = TpcLog::open(&path).unwrap();
            log.append_and_flush(&put("foo", "bar")).unwrap();
        }
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"not json\n").unwrap();
        drop(file);
        {
            // Appending through a raw handle keeps the bad line in the middle.
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"seq\":2,\"message\":\"Commit\"}\n").unwrap();
        }

        assert!(TpcLog::open(&path).is_err());
    }

    // ============================================================
    // COMPACTION
    // ============================================================

    #[test]
    fn test_compaction_keeps_latest_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.wal");
        let log = TpcLog::open(&path).unwrap();

        log.append_and_flush(&put("a", "1")).unwrap();
        log.append_and_flush(&KvMessage::Commit).unwrap();
        log.append_and_flush(&put("b", "2")).unwrap();
        let mark = log.next_seq();
        log.append_and_flush(&KvMessage::Commit).unwrap();

        // The mark is past the latest request, which must survive anyway.
        assert_eq!(log.compact(mark).unwrap(), 2);
        assert_eq!(log.len(), 2);

        let current = log.last_transaction().unwrap();
        assert_eq!(current.request, put("b", "2"));

        log.append_and_flush(&del("b")).unwrap();
        drop(log);

        let reopened = TpcLog::open(&path).unwrap();
        let seqs: Vec<u64> = reopened
            .records()
            .unwrap()
            .iter()
            .map(|record| record.seq)
            .collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(reopened.next_seq(), 5);
    }

    #[test]
    fn test_compaction_with_nothing_old_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let log = TpcLog::open(dir.path().join("replica.wal")).unwrap();
        log.append_and_flush(&put("a", "1")).unwrap();

        assert_eq!(log.compact(0).unwrap(), 0);
        assert_eq!(log.len(), 1);
    }
}
