//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cacher and manager against random operation
//! sequences.

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use crate::cache::{Lookup, LruCacher, MemoryStore};
use crate::executor::{RowSet, Value};
use crate::fingerprint::{fingerprint, normalize_sql};
use crate::manager::CacheManager;
use crate::mapper::snake_case;

// == Test Configuration ==
const TEST_CAPACITY: usize = 8;
const TABLES: [&str; 4] = ["users", "orders", "items", "accounts"];

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,3}".prop_map(|s| s)
}

fn rows(n: i64) -> Arc<RowSet> {
    Arc::new(RowSet::scalar("n", Value::Int(n)))
}

#[derive(Debug, Clone)]
enum CacherOp {
    Put { key: String, value: i64 },
    Get { key: String },
    Delete { key: String },
}

fn cacher_op_strategy() -> impl Strategy<Value = CacherOp> {
    prop_oneof![
        (key_strategy(), any::<i64>()).prop_map(|(key, value)| CacherOp::Put { key, value }),
        key_strategy().prop_map(|key| CacherOp::Get { key }),
        key_strategy().prop_map(|key| CacherOp::Delete { key }),
    ]
}

#[derive(Debug, Clone)]
enum ManagerOp {
    /// Cache a read of `id` touching the given tables
    Read { id: i64, tables: Vec<usize> },
    Invalidate { table: usize },
    Lookup { id: i64, table: usize },
    Clear,
}

fn manager_op_strategy() -> impl Strategy<Value = ManagerOp> {
    let table = 0..TABLES.len();
    prop_oneof![
        6 => (0i64..20, prop::collection::vec(table.clone(), 1..3))
            .prop_map(|(id, tables)| ManagerOp::Read { id, tables }),
        3 => table.clone().prop_map(|table| ManagerOp::Invalidate { table }),
        3 => (0i64..20, table).prop_map(|(id, table)| ManagerOp::Lookup { id, table }),
        1 => Just(ManagerOp::Clear),
    ]
}

fn read_key(id: i64, first_table: &str) -> crate::fingerprint::Fingerprint {
    fingerprint("SELECT * FROM t WHERE id = ?", &[Value::Int(id)], first_table)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // The cacher never holds more than its capacity, and its recency order
    // matches a simple model where get and put move a key to the back.
    #[test]
    fn prop_cacher_matches_lru_model(ops in prop::collection::vec(cacher_op_strategy(), 1..100)) {
        let mut cacher = LruCacher::new(MemoryStore::new(), TEST_CAPACITY).unwrap();
        let mut model: VecDeque<String> = VecDeque::new();
        let mut values: HashMap<String, i64> = HashMap::new();

        for op in ops {
            match op {
                CacherOp::Put { key, value } => {
                    let expected_evicted = if !model.contains(&key) && model.len() == TEST_CAPACITY {
                        model.pop_front()
                    } else {
                        None
                    };
                    model.retain(|k| k != &key);
                    model.push_back(key.clone());
                    if let Some(old) = &expected_evicted {
                        values.remove(old);
                    }
                    values.insert(key.clone(), value);

                    prop_assert_eq!(cacher.put(&key, rows(value)), expected_evicted);
                }
                CacherOp::Get { key } => {
                    match cacher.get(&key) {
                        Lookup::Hit(found) => {
                            prop_assert_eq!(&found.rows[0][0], &Value::Int(values[&key]));
                            model.retain(|k| k != &key);
                            model.push_back(key);
                        }
                        Lookup::Miss => prop_assert!(!model.contains(&key)),
                        Lookup::Expired => prop_assert!(false, "no ttl configured"),
                    }
                }
                CacherOp::Delete { key } => {
                    let present = model.contains(&key);
                    model.retain(|k| k != &key);
                    values.remove(&key);
                    prop_assert_eq!(cacher.delete(&key), present);
                }
            }

            prop_assert!(cacher.len() <= TEST_CAPACITY);
            prop_assert_eq!(cacher.keys(), model.iter().cloned().collect::<Vec<_>>());
        }

        prop_assert_eq!(cacher.stats().total_entries, cacher.len());
    }

    // Whatever mix of reads, invalidations and evictions happens, every
    // indexed fingerprint is cached and every cached fingerprint is indexed.
    // After invalidating a table none of its reads can be found.
    #[test]
    fn prop_manager_index_stays_consistent(ops in prop::collection::vec(manager_op_strategy(), 1..120)) {
        let manager = CacheManager::new(LruCacher::new(MemoryStore::new(), TEST_CAPACITY).unwrap());
        let mut tags: HashMap<crate::fingerprint::Fingerprint, BTreeSet<String>> = HashMap::new();

        for op in ops {
            match op {
                ManagerOp::Read { id, tables } => {
                    let tables: BTreeSet<String> =
                        tables.iter().map(|&i| TABLES[i].to_string()).collect();
                    let first = tables.iter().next().cloned().unwrap_or_default();
                    let fp = read_key(id, &first);
                    let snapshot = manager.snapshot(&tables);
                    prop_assert!(manager.populate(&fp, &tables, rows(id), &snapshot));
                    tags.insert(fp, tables);
                }
                ManagerOp::Invalidate { table } => {
                    let table = TABLES[table];
                    manager.invalidate_table(table);
                    for (fp, tables) in &tags {
                        if tables.contains(table) {
                            prop_assert!(!manager.contains(fp));
                        }
                    }
                    prop_assert!(manager.fingerprints_for(table).is_empty());
                }
                ManagerOp::Lookup { id, table } => {
                    let _ = manager.lookup(&read_key(id, TABLES[table]));
                }
                ManagerOp::Clear => manager.invalidate_all(),
            }

            prop_assert!(manager.len() <= TEST_CAPACITY);
            prop_assert!(manager.check_consistency().is_ok());
        }
    }

    // Reformatting whitespace or keyword case never changes a fingerprint.
    #[test]
    fn prop_fingerprint_ignores_layout(
        id in any::<i64>(),
        spaces in prop::collection::vec(" {1,4}|\n|\t", 5),
    ) {
        let compact = "select * from users where id = ?";
        let spaced = format!(
            "SELECT{}*{}FROM users{}WHERE id{}={}?",
            spaces[0], spaces[1], spaces[2], spaces[3], spaces[4]
        );

        prop_assert_eq!(normalize_sql(compact), normalize_sql(&spaced));
        prop_assert_eq!(
            fingerprint(compact, &[Value::Int(id)], "users"),
            fingerprint(&spaced, &[Value::Int(id)], "users")
        );
    }

    // Distinct parameter values give distinct fingerprints.
    #[test]
    fn prop_fingerprint_distinguishes_params(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let sql = "SELECT * FROM users WHERE id = ?";
        prop_assert_ne!(
            fingerprint(sql, &[Value::Int(a)], "users"),
            fingerprint(sql, &[Value::Int(b)], "users")
        );
    }

    // Snake-casing is idempotent.
    #[test]
    fn prop_snake_case_idempotent(name in "[A-Za-z][A-Za-z0-9]{0,20}") {
        let once = snake_case(&name);
        prop_assert_eq!(snake_case(&once), once);
    }
}
