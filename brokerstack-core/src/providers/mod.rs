//! Resource type definitions shared by every provider

pub mod aws;

use std::collections::HashMap;

use crate::schema::ResourceSchema;

/// All schemas keyed by resource type
pub fn all_schemas() -> HashMap<String, ResourceSchema> {
    aws::schemas()
        .into_iter()
        .map(|s| (s.resource_type.clone(), s))
        .collect()
}
