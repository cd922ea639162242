//! Structural table metadata via `SQLite` pragmas.

use crate::error::RecordMiddlewareError;
use crate::types::DataType;

pub(crate) struct TableColumnInfo {
    pub name: String,
    pub data_type: DataType,
    pub is_identifier: bool,
    pub is_auto_increment: bool,
    pub is_unique: bool,
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column names, declared types, and structural flags for `table`.
/// Identifier/auto-increment come from `table_info`; unique flags from
/// single-column unique indexes.
pub(crate) fn table_metadata(
    conn: &rusqlite::Connection,
    table: &str,
) -> Result<Vec<TableColumnInfo>, RecordMiddlewareError> {
    let mut columns = Vec::new();
    {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get("name")?;
            let declared: String = row.get("type")?;
            let pk: i64 = row.get("pk")?;
            let data_type = map_declared_type(&declared);
            let is_identifier = pk > 0;
            // INTEGER PRIMARY KEY aliases the rowid and self-assigns
            let is_auto_increment = is_identifier && data_type == DataType::Int64;
            columns.push(TableColumnInfo {
                name,
                data_type,
                is_identifier,
                is_auto_increment,
                is_unique: false,
            });
        }
    }

    let unique_indexes: Vec<String> = {
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", quote(table)))?;
        let mut rows = stmt.query([])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            let unique: i64 = row.get("unique")?;
            if unique == 1 {
                names.push(row.get("name")?);
            }
        }
        names
    };

    for index in unique_indexes {
        let mut stmt = conn.prepare(&format!("PRAGMA index_info({})", quote(&index)))?;
        let mut rows = stmt.query([])?;
        let mut members: Vec<String> = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(row.get("name")?);
        }
        // only single-column indexes translate to a per-field flag
        if let [member] = members.as_slice() {
            if let Some(column) = columns
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(member))
            {
                column.is_unique = true;
            }
        }
    }

    Ok(columns)
}

/// Declared-type to tag mapping, following `SQLite` affinity rules.
pub(crate) fn map_declared_type(declared: &str) -> DataType {
    let upper = declared.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return DataType::Binary;
    }
    if upper.contains("BOOL") {
        return DataType::Bool;
    }
    if upper.contains("SMALLINT") || upper.contains("INT2") {
        return DataType::Int16;
    }
    if upper.contains("INT") {
        return DataType::Int64;
    }
    if upper.contains("JSON") {
        return DataType::UserDefined;
    }
    if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        return DataType::Text;
    }
    if upper.contains("BLOB") {
        return DataType::Binary;
    }
    if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        return DataType::Float;
    }
    if upper.contains("DEC") || upper.contains("NUM") {
        return DataType::Decimal;
    }
    if upper.contains("DATETIME") || upper.contains("TIMESTAMP") || upper.contains("DATE") {
        return DataType::DateTime;
    }
    DataType::Text
}
