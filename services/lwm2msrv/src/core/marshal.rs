//! Conversions between contiguous Modbus arrays and the index-keyed maps
//! used by multi-instance LwM2M resources

use std::collections::BTreeMap;

/// `values[i]` becomes entry `i`
pub fn array_to_index_map<T: Clone>(values: &[T]) -> BTreeMap<u16, T> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u16, v.clone()))
        .collect()
}

/// Inverse of [`array_to_index_map`]
///
/// Precondition: the keys are exactly `0..map.len()`. Check with
/// [`is_dense`] first when the map comes from outside; on a sparse map the
/// values are returned in key order.
pub fn index_map_to_array<T: Clone>(map: &BTreeMap<u16, T>) -> Vec<T> {
    debug_assert!(is_dense(map), "instance ids must be 0..n");
    map.values().cloned().collect()
}

/// True when the keys are `0, 1, .., len - 1`
pub fn is_dense<T>(map: &BTreeMap<u16, T>) -> bool {
    map.keys()
        .enumerate()
        .all(|(i, &key)| usize::from(key) == i)
}
