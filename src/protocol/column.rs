//! Column definition packets (Protocol::ColumnDefinition41).

use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// Column metadata as delivered ahead of each result set.
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

/// Parse a column definition packet.
///
/// Layout: six length-encoded strings (catalog, schema, table, org_table,
/// name, org_name), a length-encoded `0x0c` marker, then the fixed tail:
/// charset (2), column length (4), type (1), flags (2), decimals (1),
/// filler (2).
pub fn read_column_definition(payload: &[u8]) -> Result<ColumnDefinition> {
    let (catalog, data) = read_string_lenenc(payload)?;
    let (schema, data) = read_string_lenenc(data)?;
    let (table, data) = read_string_lenenc(data)?;
    let (org_table, data) = read_string_lenenc(data)?;
    let (name, data) = read_string_lenenc(data)?;
    let (org_name, data) = read_string_lenenc(data)?;

    let (_fixed_len, data) = read_int_lenenc(data)?;

    let (charset, data) = read_int_2(data)?;
    let (column_length, data) = read_int_4(data)?;
    let (type_byte, data) = read_int_1(data)?;
    let column_type = ColumnType::from_u8(type_byte).ok_or(Error::InvalidPacket)?;
    let (flags, data) = read_int_2(data)?;
    let (decimals, data) = read_int_1(data)?;
    let (_filler, data) = read_string_fix(data, 2)?;
    expect_fully_consumed(data)?;

    Ok(ColumnDefinition {
        catalog: String::from_utf8_lossy(catalog).into_owned(),
        schema: String::from_utf8_lossy(schema).into_owned(),
        table: String::from_utf8_lossy(table).into_owned(),
        org_table: String::from_utf8_lossy(org_table).into_owned(),
        name: String::from_utf8_lossy(name).into_owned(),
        org_name: String::from_utf8_lossy(org_name).into_owned(),
        charset,
        column_length,
        column_type,
        flags: ColumnFlags::from_bits_truncate(flags),
        decimals,
    })
}

/// Encode a column definition. The driver itself never sends these; the
/// encoder exists so tests can script a server.
pub fn write_column_definition(out: &mut Vec<u8>, col: &ColumnDefinition) {
    write_string_lenenc(out, &col.catalog);
    write_string_lenenc(out, &col.schema);
    write_string_lenenc(out, &col.table);
    write_string_lenenc(out, &col.org_table);
    write_string_lenenc(out, &col.name);
    write_string_lenenc(out, &col.org_name);
    write_int_lenenc(out, 0x0c);
    write_int_2(out, col.charset);
    write_int_4(out, col.column_length);
    write_int_1(out, col.column_type as u8);
    write_int_2(out, col.flags.bits());
    write_int_1(out, col.decimals);
    write_int_2(out, 0);
}

impl ColumnDefinition {
    /// A minimal definition, enough for scripting result sets in tests.
    pub fn named(name: &str, column_type: ColumnType) -> Self {
        Self {
            catalog: "def".to_string(),
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: name.to_string(),
            org_name: name.to_string(),
            charset: 33,
            column_length: 255,
            column_type,
            flags: ColumnFlags::empty(),
            decimals: 0,
        }
    }
}
