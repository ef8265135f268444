//! Index template definition.
//!
//! Every template prefix gets the same template: fixed shard, replica and
//! refresh settings, plus dynamic mapping rules keyed by field name.

use serde_json::{json, Value};

use crate::config::TemplateConfig;

/// Template prefixes configured in `config`, trimmed, without empty entries.
pub fn template_prefixes(config: &TemplateConfig) -> Vec<&str> {
    config
        .name_prefixes
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Body of the template registered for `prefix`.
///
/// The dynamic templates are applied in order:
/// - `dt*` fields are mapped as `date`
/// - `geop*` fields are mapped as `geo_point`
/// - any other field keeps its detected type with doc values enabled
///
/// Numeric detection is off, so numbers sent as strings stay strings.
pub fn template_body(prefix: &str, config: &TemplateConfig) -> Value {
    json!({
        "index_patterns": [format!("{}*", prefix)],
        "settings": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas,
            "refresh_interval": config.refresh_interval
        },
        "mappings": {
            "numeric_detection": false,
            "dynamic_templates": [
                {
                    "date_tpl": {
                        "match": "dt*",
                        "mapping": { "type": "date", "doc_values": true }
                    }
                },
                {
                    "geo_point_tpl": {
                        "match": "geop*",
                        "mapping": { "type": "geo_point", "doc_values": true }
                    }
                },
                {
                    "all_tpl": {
                        "match": "*",
                        "mapping": { "type": "{dynamic_type}", "doc_values": true }
                    }
                }
            ]
        }
    })
}
