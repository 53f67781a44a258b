use proptest::prelude::*;
use reorderable_core::db::open_db_in_memory;
use reorderable_core::{
    AllowAll, MoveRequest, RankStore, RecordId, ReorderService, SqliteRankStore,
};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
enum Op {
    After(usize, usize),
    Before(usize, usize),
    Dedupe,
}

fn op_strategy() -> impl Strategy<Value = (usize, usize, u8)> {
    (0usize..64, 0usize..64, 0u8..3)
}

fn resolve(len: usize, (a, b, kind): (usize, usize, u8)) -> Op {
    let moved = a % len;
    let reference = (moved + 1 + b % (len - 1)) % len;
    match kind {
        0 => Op::After(moved, reference),
        1 => Op::Before(moved, reference),
        _ => Op::Dedupe,
    }
}

fn seed(conn: &Connection, ranks: &[i64]) -> Vec<RecordId> {
    ranks
        .iter()
        .enumerate()
        .map(|(index, rank)| {
            conn.query_row(
                "INSERT INTO entries (list_id, title, sort_order) VALUES (1, ?1, ?2) RETURNING id;",
                rusqlite::params![format!("r{index}"), rank],
                |row| row.get(0),
            )
            .unwrap()
        })
        .collect()
}

fn seed_nullable(conn: &Connection, ranks: &[Option<i64>]) -> Vec<RecordId> {
    ranks
        .iter()
        .enumerate()
        .map(|(index, rank)| {
            conn.query_row(
                "INSERT INTO entries (list_id, title, sort_order) VALUES (1, ?1, ?2) RETURNING id;",
                rusqlite::params![format!("r{index}"), rank],
                |row| row.get(0),
            )
            .unwrap()
        })
        .collect()
}

fn rank_of<S: RankStore>(store: &S, id: RecordId) -> Option<i64> {
    store.get(id).unwrap().unwrap().rank
}

fn listing<S: RankStore>(store: &S) -> (Vec<RecordId>, Vec<i64>) {
    store
        .list()
        .unwrap()
        .into_iter()
        .map(|record| (record.id, record.effective_rank()))
        .unzip()
}

fn strictly_increasing(ranks: &[i64]) -> bool {
    ranks.windows(2).all(|pair| pair[0] < pair[1])
}

fn place(order: &mut Vec<RecordId>, moved: RecordId, reference: RecordId, after: bool) {
    order.retain(|&id| id != moved);
    let Some(at) = order.iter().position(|&id| id == reference) else {
        return;
    };
    order.insert(if after { at + 1 } else { at }, moved);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_operation_leaves_unique_ranks_in_expected_order(
        ranks in prop::collection::vec(1i64..=6, 2..10),
        raw_ops in prop::collection::vec(op_strategy(), 1..12),
    ) {
        let conn = open_db_in_memory().unwrap();
        let ids = seed(&conn, &ranks);
        let service = ReorderService::new(
            SqliteRankStore::entries(&conn, Some(1)).unwrap(),
            AllowAll,
        );

        let (mut expected, _) = listing(service.store());

        for raw in raw_ops {
            match resolve(ids.len(), raw) {
                Op::After(moved, reference) => {
                    service
                        .move_record(&(), &MoveRequest::after(ids[moved], ids[reference]))
                        .unwrap();
                    place(&mut expected, ids[moved], ids[reference], true);
                }
                Op::Before(moved, reference) => {
                    service
                        .move_record(&(), &MoveRequest::before(ids[moved], ids[reference]))
                        .unwrap();
                    place(&mut expected, ids[moved], ids[reference], false);
                }
                Op::Dedupe => {
                    service.deduplicate().unwrap();
                }
            }

            let (order, current) = listing(service.store());
            prop_assert!(strictly_increasing(&current), "ranks collide: {:?}", current);
            prop_assert_eq!(&order, &expected);
        }
    }

    #[test]
    fn deduplication_keeps_listing_order_and_lowest_rank(
        ranks in prop::collection::vec(-3i64..=5, 1..16),
    ) {
        let conn = open_db_in_memory().unwrap();
        seed(&conn, &ranks);
        let service = ReorderService::new(
            SqliteRankStore::entries(&conn, Some(1)).unwrap(),
            AllowAll,
        );
        let (before_order, before_ranks) = listing(service.store());

        service.deduplicate().unwrap();

        let (after_order, after_ranks) = listing(service.store());
        prop_assert_eq!(before_order, after_order);
        prop_assert!(strictly_increasing(&after_ranks));
        prop_assert_eq!(before_ranks.first(), after_ranks.first());
        prop_assert!(before_ranks.iter().zip(&after_ranks).all(|(old, new)| new >= old));
        prop_assert_eq!(service.deduplicate().unwrap().changed_count, 0);
    }

    #[test]
    fn moves_over_unranked_and_negative_ranks_stay_unique(
        ranks in prop::collection::vec(prop::option::of(-2i64..=6), 2..10),
        raw_ops in prop::collection::vec(op_strategy(), 1..12),
    ) {
        let conn = open_db_in_memory().unwrap();
        let ids = seed_nullable(&conn, &ranks);
        let service = ReorderService::new(
            SqliteRankStore::entries(&conn, Some(1)).unwrap(),
            AllowAll,
        );

        for raw in raw_ops {
            let op = resolve(ids.len(), raw);
            match op {
                Op::After(moved, reference) => {
                    service
                        .move_record(&(), &MoveRequest::after(ids[moved], ids[reference]))
                        .unwrap();
                }
                Op::Before(moved, reference) => {
                    service
                        .move_record(&(), &MoveRequest::before(ids[moved], ids[reference]))
                        .unwrap();
                }
                Op::Dedupe => {
                    service.deduplicate().unwrap();
                }
            }

            prop_assert!(service.store().duplicate_groups().unwrap().is_empty());

            if let Op::After(moved, reference) | Op::Before(moved, reference) = op {
                let moved_rank = rank_of(service.store(), ids[moved]);
                prop_assert!(moved_rank.is_some());
                if let (Some(moved_rank), Some(reference_rank)) =
                    (moved_rank, rank_of(service.store(), ids[reference]))
                {
                    let expected = if matches!(op, Op::After(..)) {
                        reference_rank + 1
                    } else {
                        reference_rank - 1
                    };
                    let (order, _) = listing(service.store());
                    let at = |id: RecordId| order.iter().position(|&entry| entry == id).unwrap();
                    prop_assert_eq!(
                        at(ids[moved]) as i64 - at(ids[reference]) as i64,
                        if matches!(op, Op::After(..)) { 1 } else { -1 }
                    );
                    prop_assert_eq!(moved_rank, expected);
                }
            }
        }
    }
}
