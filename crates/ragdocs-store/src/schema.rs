//! Arrow schema for the `LanceDB` chunks table.

use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Table holding one row per distinct chunk.
pub const CHUNKS_TABLE: &str = "chunks";

/// Schema for the chunks table.
#[must_use]
pub fn chunks_schema(embedding_dim: usize) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("payload", DataType::Utf8, false),
        Field::new("source_file", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                embedding_dim as i32,
            ),
            false,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_column_has_dimension() {
        let schema = chunks_schema(384);
        let field = schema.field_with_name("vector").unwrap();
        match field.data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, 384),
            other => panic!("unexpected vector type: {other:?}"),
        }
        assert_eq!(schema.fields().len(), 4);
    }
}
