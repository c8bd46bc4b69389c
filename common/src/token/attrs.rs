// Attribute (EAV) tokens
//
// `attrs(code=Output, ...)` emits one LEFT JOIN per attribute against the
// attribute-value table; `attrs_fields(code=Output, ...)` emits the matching
// `alias.value AS Output` select items. Both render aliases in sorted order.

use super::{Replacer, TokenContext, TokenParam, TokenRegistry};
use crate::composer::sql::{is_column_ref, is_identifier, quote_literal};
use crate::config::AttributeConfig;
use crate::errors::TokenError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const ATTRS_TOKEN: &str = "attrs";
pub const ATTRS_FIELDS_TOKEN: &str = "attrs_fields";

/// Attribute code plus the output column it is selected as
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrAlias {
    code: String,
    output: String,
}

/// Schema names, validated once at registration
#[derive(Debug, Clone)]
struct AttrSchema {
    table: String,
    id_column: String,
    entity_column: String,
    value_column: String,
    entity_key: String,
}

pub fn register(registry: &mut TokenRegistry, config: &AttributeConfig) {
    let schema = Arc::new(AttrSchema {
        table: config.table.clone(),
        id_column: config.id_column.clone(),
        entity_column: config.entity_column.clone(),
        value_column: config.value_column.clone(),
        entity_key: config.entity_key.clone(),
    });

    let join_schema = Arc::clone(&schema);
    registry.register_dictionary_token(ATTRS_TOKEN, move |params: &[TokenParam]| {
        let aliases = collect_aliases(params)?;
        let schema = Arc::clone(&join_schema);
        let replacer: Replacer = Box::new(move |ctx: &TokenContext<'_>| {
            let dictionary = ctx.dictionary.ok_or(TokenError::DictionaryNotLoaded)?;
            join_fragment(&aliases, dictionary, &schema)
        });
        Ok(replacer)
    });

    registry.register(ATTRS_FIELDS_TOKEN, move |params: &[TokenParam]| {
        let aliases = collect_aliases(params)?;
        let schema = Arc::clone(&schema);
        let replacer: Replacer =
            Box::new(move |_ctx: &TokenContext<'_>| Ok(select_fragment(&aliases, &schema)));
        Ok(replacer)
    });
}

/// Key each parameter by its SQL alias (`-` becomes `_`); the map order is
/// the render order
fn collect_aliases(params: &[TokenParam]) -> Result<BTreeMap<String, AttrAlias>, TokenError> {
    let mut aliases = BTreeMap::new();
    for param in params {
        let alias = param.name.replace('-', "_");
        if !is_identifier(&alias) {
            return Err(TokenError::InvalidParameter {
                name: param.name.clone(),
                reason: "attribute code does not form a valid alias".to_string(),
            });
        }
        if !is_identifier(&param.value) {
            return Err(TokenError::InvalidParameter {
                name: param.name.clone(),
                reason: format!("'{}' is not a valid output name", param.value),
            });
        }
        aliases.insert(
            alias,
            AttrAlias {
                code: param.name.clone(),
                output: param.value.clone(),
            },
        );
    }
    Ok(aliases)
}

fn join_fragment(
    aliases: &BTreeMap<String, AttrAlias>,
    dictionary: &HashMap<String, String>,
    schema: &AttrSchema,
) -> Result<String, TokenError> {
    let mut joins = Vec::with_capacity(aliases.len());
    for (alias, attr) in aliases {
        let id = dictionary
            .get(&attr.code)
            .ok_or_else(|| TokenError::UnknownAttribute(attr.code.clone()))?;
        joins.push(format!(
            "LEFT JOIN {table} AS {alias} ON {alias}.{id_column} = {id} AND {alias}.{entity_column} = {entity_key}",
            table = schema.table,
            alias = alias,
            id_column = schema.id_column,
            id = quote_literal(id),
            entity_column = schema.entity_column,
            entity_key = schema.entity_key,
        ));
    }
    Ok(joins.join(" "))
}

fn select_fragment(aliases: &BTreeMap<String, AttrAlias>, schema: &AttrSchema) -> String {
    aliases
        .iter()
        .map(|(alias, attr)| format!("{}.{} AS {}", alias, schema.value_column, attr.output))
        .collect::<Vec<_>>()
        .join(",")
}

/// True when every configured schema name is safe to splice into SQL
pub fn schema_is_valid(config: &AttributeConfig) -> bool {
    is_column_ref(&config.table)
        && is_identifier(&config.id_column)
        && is_identifier(&config.entity_column)
        && is_identifier(&config.value_column)
        && is_column_ref(&config.entity_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ComposeError;

    fn dictionary() -> HashMap<String, String> {
        HashMap::from([
            ("color".to_string(), "sid-1".to_string()),
            ("size-code".to_string(), "sid-2".to_string()),
            ("weight".to_string(), "sid-3".to_string()),
        ])
    }

    fn registry() -> TokenRegistry {
        TokenRegistry::with_standard_tokens(&AttributeConfig::default())
    }

    #[test]
    fn test_join_fragment_sorted_by_alias() {
        let dict = dictionary();
        let ctx = TokenContext {
            dictionary: Some(&dict),
        };
        let params = vec![
            TokenParam::new("weight", "Weight"),
            TokenParam::new("color", "Color"),
        ];

        let sql = registry().resolve(ATTRS_TOKEN, &params, &ctx).unwrap();
        assert_eq!(
            sql,
            "LEFT JOIN fty_obj_attr AS color ON color.attr_sid = 'sid-1' AND color.obj_sid = fty_product.sid \
             LEFT JOIN fty_obj_attr AS weight ON weight.attr_sid = 'sid-3' AND weight.obj_sid = fty_product.sid"
        );
    }

    #[test]
    fn test_dash_becomes_underscore_in_alias() {
        let dict = dictionary();
        let ctx = TokenContext {
            dictionary: Some(&dict),
        };
        let params = vec![TokenParam::new("size-code", "Size")];

        let join = registry().resolve(ATTRS_TOKEN, &params, &ctx).unwrap();
        assert!(join.contains("AS size_code ON size_code.attr_sid = 'sid-2'"));

        let select = registry()
            .resolve(ATTRS_FIELDS_TOKEN, &params, &ctx)
            .unwrap();
        assert_eq!(select, "size_code.attr_value AS Size");
    }

    #[test]
    fn test_select_fragment_order_independent() {
        let ctx = TokenContext::default();
        let a = vec![
            TokenParam::new("weight", "Weight"),
            TokenParam::new("color", "Color"),
        ];
        let b = vec![
            TokenParam::new("color", "Color"),
            TokenParam::new("weight", "Weight"),
        ];

        let first = registry().resolve(ATTRS_FIELDS_TOKEN, &a, &ctx).unwrap();
        let second = registry().resolve(ATTRS_FIELDS_TOKEN, &b, &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "color.attr_value AS Color,weight.attr_value AS Weight");
    }

    #[test]
    fn test_unknown_attribute_is_scoped_error() {
        let dict = dictionary();
        let ctx = TokenContext {
            dictionary: Some(&dict),
        };
        let params = vec![TokenParam::new("material", "Material")];

        let err = registry().resolve(ATTRS_TOKEN, &params, &ctx).unwrap_err();
        assert_eq!(
            err,
            ComposeError::TokenFailed {
                name: ATTRS_TOKEN.to_string(),
                source: TokenError::UnknownAttribute("material".to_string()),
            }
        );
    }

    #[test]
    fn test_join_without_dictionary_fails() {
        let params = vec![TokenParam::new("color", "Color")];
        let err = registry()
            .resolve(ATTRS_TOKEN, &params, &TokenContext::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::TokenFailed {
                source: TokenError::DictionaryNotLoaded,
                ..
            }
        ));
    }

    #[test]
    fn test_dictionary_ids_are_quoted() {
        let dict = HashMap::from([("color".to_string(), "o'brien".to_string())]);
        let ctx = TokenContext {
            dictionary: Some(&dict),
        };
        let params = vec![TokenParam::new("color", "Color")];
        let sql = registry().resolve(ATTRS_TOKEN, &params, &ctx).unwrap();
        assert!(sql.contains("= 'o''brien'"));
    }

    #[test]
    fn test_invalid_output_name_rejected() {
        let params = vec![TokenParam::new("color", "Color; DROP TABLE x")];
        let err = registry()
            .resolve(ATTRS_FIELDS_TOKEN, &params, &TokenContext::default())
            .unwrap_err();
        assert!(err.is_token_failure());
    }

    #[test]
    fn test_default_schema_is_valid() {
        assert!(schema_is_valid(&AttributeConfig::default()));
        let mut config = AttributeConfig::default();
        config.table = "t; --".to_string();
        assert!(!schema_is_valid(&config));
    }
}
