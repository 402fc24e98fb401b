//! Database schema for content.db.

use crate::sqlite_column;
use rusqlite::Connection;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

/// Content items
const CONTENT_ITEMS_TABLE_V0: Table = Table {
    name: "content_items",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("content_type", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true, default_value = Some("''")),
        sqlite_column!("body", &SqlType::Text, non_null = true, default_value = Some("''")),
        sqlite_column!(
            "modified_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_content_type_status", "content_type, status")],
    primary_key: None,
};

/// Arbitrary per-item key/value metadata
const CONTENT_META_TABLE_V0: Table = Table {
    name: "content_meta",
    columns: &[
        sqlite_column!("item_id", &SqlType::Integer, non_null = true),
        sqlite_column!("meta_key", &SqlType::Text, non_null = true),
        sqlite_column!("meta_value", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_content_meta_key", "meta_key")],
    primary_key: Some(&["item_id", "meta_key"]),
};

/// Named leases shared by every process opening the database
const PROCESSING_LEASES_TABLE_V1: Table = Table {
    name: "processing_leases",
    columns: &[
        sqlite_column!("name", &SqlType::Text, is_primary_key = true),
        sqlite_column!("owner", &SqlType::Text, non_null = true),
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    primary_key: None,
};

pub const CONTENT_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[CONTENT_ITEMS_TABLE_V0, CONTENT_META_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            CONTENT_ITEMS_TABLE_V0,
            CONTENT_META_TABLE_V0,
            PROCESSING_LEASES_TABLE_V1,
        ],
        migration: Some(|conn: &Connection| {
            PROCESSING_LEASES_TABLE_V1.create(conn)?;
            Ok(())
        }),
    },
];
