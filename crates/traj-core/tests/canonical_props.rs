use std::collections::HashMap;

use proptest::prelude::*;
use traj_core::{from_message_bytes, stable_hash_string, to_message_bytes, Value};

proptest! {
    #[test]
    fn digest_ignores_map_insertion_order(entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 1..12)) {
        let forward: HashMap<String, i64> = entries.clone().into_iter().collect();
        let mut reversed = HashMap::with_capacity(entries.len());
        for (key, value) in entries.into_iter().rev() {
            reversed.insert(key, value);
        }
        prop_assert_eq!(stable_hash_string(&forward).unwrap(), stable_hash_string(&reversed).unwrap());
    }

    #[test]
    fn integer_literals_parse_as_ints(value in any::<i64>()) {
        prop_assert_eq!(Value::parse_literal(&value.to_string()), Value::Int(value));
    }

    #[test]
    fn values_survive_the_worker_boundary(items in proptest::collection::vec(-1.0e6f64..1.0e6, 0..16)) {
        let value = Value::List(items.iter().copied().map(Value::Float).collect());
        let bytes = to_message_bytes(&value).unwrap();
        prop_assert_eq!(from_message_bytes::<Value>(&bytes).unwrap(), value);
    }
}
