//! Collection-space size reports.

use crate::types::CollectionSpaceReport;
use sdb_rest_protocol::Record;
use serde_json::Value;

/// Extracts the collection-space name from its item-key argument.
///
/// The name is everything after the second underscore, so
/// `"sdb_prod_cs_orders"` names `"cs_orders"`. Arguments with fewer segments
/// name themselves.
pub fn collection_space_name(argument: &str) -> &str {
    argument.splitn(3, '_').last().unwrap_or(argument)
}

/// Folds snapshot records into one mapping; later records overwrite earlier
/// keys.
pub fn merge_records(records: Vec<Record>) -> Record {
    let mut merged = Record::new();
    for record in records {
        merged.extend(record);
    }
    merged
}

pub fn collection_space_report(name: &str, snapshot: &Record) -> CollectionSpaceReport {
    let size = |key: &str| snapshot.get(key).and_then(Value::as_i64).unwrap_or(-1);
    let count = |key: &str| {
        snapshot
            .get(key)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    };

    CollectionSpaceReport {
        csname: name.to_string(),
        page_size: size("PageSize"),
        lob_page_size: size("LobPageSize"),
        total_size: size("TotalSize"),
        free_size: size("FreeSize"),
        total_data_size: size("TotalDataSize"),
        free_data_size: size("FreeDataSize"),
        total_index_size: size("TotalIndexSize"),
        free_index_size: size("FreeIndexSize"),
        total_lob_size: size("TotalLobSize"),
        free_lob_size: size("FreeLobSize"),
        collection_count: count("Collection"),
        group_count: count("Group"),
    }
}
