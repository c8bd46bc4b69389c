// Predicate and ordering rendering
//
// Filter values are never spliced into SQL text: every value becomes a `?`
// placeholder plus a positional argument.

use super::sql::is_column_ref;
use super::{Combinator, FilterGroup};
use crate::errors::ComposeError;
use crate::models::{Filter, Operator, SortSpec};
use crate::template::Template;
use serde_json::Value;

/// Map a caller-supplied name to a column expression
pub(crate) fn resolve_column<'t>(template: &'t Template, name: &'t str) -> Result<&'t str, ComposeError> {
    if let Some(column) = template.field(name) {
        return Ok(column);
    }
    if is_column_ref(name) {
        Ok(name)
    } else {
        Err(ComposeError::InvalidIdentifier(name.to_string()))
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn render_filter(
    template: &Template,
    filter: &Filter,
    args: &mut Vec<Value>,
) -> Result<String, ComposeError> {
    filter
        .validate()
        .map_err(|reason| ComposeError::InvalidFilter {
            attr: filter.attr.clone(),
            reason,
        })?;
    let column = resolve_column(template, &filter.attr)?;

    let sql = match filter.op {
        Operator::IsNull | Operator::IsNotNull => format!("{} {}", column, filter.op.as_sql()),
        Operator::In | Operator::NotIn => {
            let items = filter.val.as_array().map(Vec::as_slice).unwrap_or_default();
            args.extend(items.iter().cloned());
            format!("{} {} ({})", column, filter.op.as_sql(), placeholders(items.len()))
        }
        Operator::Between => {
            let items = filter.val.as_array().map(Vec::as_slice).unwrap_or_default();
            args.extend(items.iter().cloned());
            format!("{} BETWEEN ? AND ?", column)
        }
        _ => {
            args.push(filter.val.clone());
            format!("{} {} ?", column, filter.op.as_sql())
        }
    };
    Ok(sql)
}

/// Render every filter group as one predicate, or `None` when there are none
pub(crate) fn render_predicates(
    template: &Template,
    groups: &[FilterGroup],
    args: &mut Vec<Value>,
) -> Result<Option<String>, ComposeError> {
    let mut rendered = Vec::new();

    for group in groups.iter().filter(|g| !g.filters.is_empty()) {
        let mut parts = Vec::with_capacity(group.filters.len());
        for filter in &group.filters {
            parts.push(render_filter(template, filter, args)?);
        }

        let joiner = match group.combinator {
            Combinator::And => " AND ",
            Combinator::Or => " OR ",
        };
        if parts.len() == 1 {
            rendered.extend(parts);
        } else {
            rendered.push(format!("({})", parts.join(joiner)));
        }
    }

    if rendered.is_empty() {
        Ok(None)
    } else {
        Ok(Some(rendered.join(" AND ")))
    }
}

/// `ORDER BY ...`, or an empty string when no ordering was requested
pub(crate) fn render_order_by(
    template: &Template,
    sorts: &[SortSpec],
) -> Result<String, ComposeError> {
    if sorts.is_empty() {
        return Ok(String::new());
    }

    let terms = sorts
        .iter()
        .map(|sort| {
            resolve_column(template, &sort.field)
                .map(|column| format!("{} {}", column, sort.direction.as_sql()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(format!("ORDER BY {}", terms.join(", ")))
}
