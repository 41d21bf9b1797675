// ============================================================================
// Event Journal + Book Snapshots
// ============================================================================
//
// Each pair actor is event-sourced: every state-changing event is appended
// to a per-pair sled tree under a monotonically increasing sequence
// number, and the book is periodically checkpointed together with the
// sequence number the checkpoint supersedes. Recovery loads the latest
// snapshot and replays strictly newer journal entries through the same
// transition the live actor uses.
//
// ============================================================================

use crate::errors::MatcherError;
use crate::events::Event;
use crate::limit_order::LimitOrder;
use serde::{Deserialize, Serialize};

/// Snapshot schema version. Bump when the layout changes.
pub const SNAPSHOT_FORMAT: u32 = 1;

const SNAPSHOT_KEY: &[u8] = b"snapshot";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub format: u32,
    /// Journal entries at or below this sequence are folded in.
    pub offset: u64,
    pub bids: Vec<LimitOrder>,
    pub asks: Vec<LimitOrder>,
}

pub struct PairJournal {
    events: sled::Tree,
    meta: sled::Tree,
    next_seq: u64,
}

impl PairJournal {
    pub fn open(db: &sled::Db, pair_key: &str) -> Result<Self, MatcherError> {
        let events = db.open_tree(format!("journal:{}", pair_key))?;
        let meta = db.open_tree(format!("journal-meta:{}", pair_key))?;
        let next_seq = match events.last()? {
            Some((key, _)) => decode_seq(&key) + 1,
            None => 1,
        };
        Ok(PairJournal {
            events,
            meta,
            next_seq,
        })
    }

    /// Append one event; returns its sequence number.
    pub fn append(&mut self, event: &Event) -> Result<u64, MatcherError> {
        let seq = self.next_seq;
        self.events
            .insert(seq.to_be_bytes(), bincode::serialize(event)?)?;
        self.events.flush()?;
        self.next_seq += 1;
        Ok(seq)
    }

    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn save_snapshot(
        &self,
        bids: Vec<LimitOrder>,
        asks: Vec<LimitOrder>,
    ) -> Result<(), MatcherError> {
        let record = SnapshotRecord {
            format: SNAPSHOT_FORMAT,
            offset: self.last_seq(),
            bids,
            asks,
        };
        self.meta.insert(SNAPSHOT_KEY, bincode::serialize(&record)?)?;
        self.meta.flush()?;
        Ok(())
    }

    pub fn load_snapshot(&self) -> Result<Option<SnapshotRecord>, MatcherError> {
        match self.meta.get(SNAPSHOT_KEY)? {
            Some(bytes) => {
                let record: SnapshotRecord = bincode::deserialize(&bytes)?;
                if record.format != SNAPSHOT_FORMAT {
                    return Err(MatcherError::Internal(format!(
                        "unsupported snapshot format {}",
                        record.format
                    )));
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Journal entries strictly after `offset`, in order.
    pub fn replay_after(&self, offset: u64) -> Result<Vec<(u64, Event)>, MatcherError> {
        let mut entries = Vec::new();
        for item in self.events.range(seq_key(offset + 1)..) {
            let (key, value) = item?;
            entries.push((decode_seq(&key), bincode::deserialize(&value)?));
        }
        Ok(entries)
    }
}

fn seq_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

fn decode_seq(key: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[..8]);
    u64::from_be_bytes(bytes)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::PublicKey;
    use crate::assets::{AssetId, AssetPair};
    use crate::events::OrderAdded;
    use crate::order::{Order, OrderSide};

    fn event(amount: u64) -> Event {
        Event::Added(OrderAdded {
            order: LimitOrder::new(Order {
                sender_public_key: PublicKey([1; 32]),
                matcher_public_key: PublicKey([2; 32]),
                asset_pair: AssetPair::new(Some(AssetId([3; 32])), None),
                side: OrderSide::Buy,
                price: 100,
                amount,
                matcher_fee: 300_000,
                timestamp: 1,
                expiration: u64::MAX,
                version: 1,
                proofs: vec![],
            }),
        })
    }

    #[test]
    fn test_append_and_replay() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let mut journal = PairJournal::open(&db, "pair").unwrap();

        assert_eq!(journal.append(&event(1)).unwrap(), 1);
        assert_eq!(journal.append(&event(2)).unwrap(), 2);
        assert_eq!(journal.append(&event(3)).unwrap(), 3);

        let all = journal.replay_after(0).unwrap();
        assert_eq!(all.len(), 3);
        let tail = journal.replay_after(2).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].0, 3);
    }

    #[test]
    fn test_sequence_survives_reopen() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        {
            let mut journal = PairJournal::open(&db, "pair").unwrap();
            journal.append(&event(1)).unwrap();
            journal.append(&event(2)).unwrap();
        }
        let mut journal = PairJournal::open(&db, "pair").unwrap();
        assert_eq!(journal.last_seq(), 2);
        assert_eq!(journal.append(&event(3)).unwrap(), 3);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let mut journal = PairJournal::open(&db, "pair").unwrap();
        journal.append(&event(1)).unwrap();

        assert!(journal.load_snapshot().unwrap().is_none());
        journal.save_snapshot(vec![], vec![]).unwrap();
        let snapshot = journal.load_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.format, SNAPSHOT_FORMAT);
        assert_eq!(snapshot.offset, 1);
    }
}
