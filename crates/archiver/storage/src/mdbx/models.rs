//! Database table schemas used by the MDBX sink.
//!
//! The tables are registered using [`reth_db_api::table::TableInfo`] and grouped into a
//! [`reth_db_api::TableSet`] for database initialization via Reth's storage-api.

use reth_db_api::{DatabaseError, table::Table};
use serde::{Deserialize, Serialize};

/// A compressed block payload as produced by [`crate::codec::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredBlock(pub Vec<u8>);

/// A watermark value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredWatermark(pub u64);

/// Key of the single row in [`Watermarks`].
pub(crate) const WATERMARK_KEY: u64 = 0;

impl reth_db_api::table::Compress for StoredBlock {
    type Compressed = Vec<u8>;

    fn compress_to_buf<B: bytes::BufMut + AsMut<[u8]>>(&self, buf: &mut B) {
        buf.put_slice(&self.0);
    }
}

impl reth_db_api::table::Decompress for StoredBlock {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        Ok(Self(value.to_vec()))
    }
}

impl reth_db_api::table::Compress for StoredWatermark {
    type Compressed = Vec<u8>;

    fn compress_to_buf<B: bytes::BufMut + AsMut<[u8]>>(&self, buf: &mut B) {
        buf.put_u64(self.0);
    }
}

impl reth_db_api::table::Decompress for StoredWatermark {
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError> {
        let bytes: [u8; 8] = value.try_into().map_err(|_| DatabaseError::Decode)?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

/// Archived blocks by block number.
///
/// - **Key**: `u64`, the block number. Big endian, so cursor order is numeric order.
/// - **Value**: [`StoredBlock`], the compressed block payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct ArchivedBlocks;

impl Table for ArchivedBlocks {
    const NAME: &'static str = "archived_blocks";
    const DUPSORT: bool = false;

    type Key = u64;
    type Value = StoredBlock;
}

/// The archiver watermark, a single row under [`WATERMARK_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Watermarks;

impl Table for Watermarks {
    const NAME: &'static str = "watermarks";
    const DUPSORT: bool = false;

    type Key = u64;
    type Value = StoredWatermark;
}

/// Implements [`reth_db_api::table::TableInfo`] for one or more table types that implement
/// [`reth_db_api::table::Table`].
macro_rules! impl_table_info {
    ($($table:ty),+ $(,)?) => {
        $(
            impl reth_db_api::table::TableInfo for $table
            where
                $table: reth_db_api::table::Table,
            {
                fn name(&self) -> &'static str {
                    <$table as reth_db_api::table::Table>::NAME
                }

                fn is_dupsort(&self) -> bool {
                    <$table as reth_db_api::table::Table>::DUPSORT
                }
            }
        )+
    };
}

/// Declares a struct representing a collection of tables and implements [`reth_db_api::TableSet`]
/// for it.
///
/// The resulting struct can be passed to Reth's `init_db_for::<_, YourTableSet>()`
/// to initialize only the specified tables.
macro_rules! impl_table_set {
    (
        $(#[$outer:meta])*
        $set_name:ident, $($table:ty),+ $(,)?
    ) => {
        $(#[$outer])*
        #[derive(Debug)]
        pub(crate) struct $set_name;

        impl reth_db_api::TableSet for $set_name {
            fn tables() -> Box<dyn Iterator<Item = Box<dyn reth_db_api::table::TableInfo>>> {
                Box::new(vec![
                    $(
                        Box::new(<$table>::default()) as Box<dyn reth_db_api::table::TableInfo>
                    ),*
                ].into_iter())
            }
        }
    };
}

impl_table_info!(ArchivedBlocks, Watermarks);

impl_table_set!(
    /// Every table of the archiver database.
    ArchiverTables, ArchivedBlocks, Watermarks
);
