//! Tantivy schema of authorization documents
//!
//! 1. `id` - `auth_<entity uuid>` (STORED, keyword, upsert key)
//! 2. `routing` - Entity UUID (STORED, keyword)
//! 3. `type` - Relation name, always `auth` (STORED, keyword)
//! 4. `allow_anyone` - Public flag (STORED, indexed)
//! 5. `group_ids` - Granted groups (STORED, keyword, multi-valued)
//! 6. `user_ids` - Granted users (STORED, keyword, multi-valued)

use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED,
};

pub const FIELD_ID: &str = "id";
pub const FIELD_ROUTING: &str = "routing";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_ALLOW_ANYONE: &str = "allow_anyone";
pub const FIELD_GROUP_IDS: &str = "group_ids";
pub const FIELD_USER_IDS: &str = "user_ids";

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    let keyword = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("raw")
                .set_index_option(IndexRecordOption::Basic),
        )
        .set_stored();

    schema_builder.add_text_field(FIELD_ID, keyword.clone());
    schema_builder.add_text_field(FIELD_ROUTING, keyword.clone());
    schema_builder.add_text_field(FIELD_TYPE, keyword.clone());
    schema_builder.add_bool_field(FIELD_ALLOW_ANYONE, INDEXED | STORED);
    schema_builder.add_text_field(FIELD_GROUP_IDS, keyword.clone());
    schema_builder.add_text_field(FIELD_USER_IDS, keyword);

    schema_builder.build()
}

/// Field handles
#[derive(Debug, Clone)]
pub struct SchemaFields {
    pub schema: Schema,
    pub id: Field,
    pub routing: Field,
    pub doc_type: Field,
    pub allow_anyone: Field,
    pub group_ids: Field,
    pub user_ids: Field,
}

impl SchemaFields {
    pub fn new() -> tantivy::Result<Self> {
        let schema = build_schema();

        Ok(Self {
            id: schema.get_field(FIELD_ID)?,
            routing: schema.get_field(FIELD_ROUTING)?,
            doc_type: schema.get_field(FIELD_TYPE)?,
            allow_anyone: schema.get_field(FIELD_ALLOW_ANYONE)?,
            group_ids: schema.get_field(FIELD_GROUP_IDS)?,
            user_ids: schema.get_field(FIELD_USER_IDS)?,
            schema,
        })
    }
}
