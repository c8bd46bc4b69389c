// Query composer
//
// Renders one subject of a template into a parameterized statement plus its
// positional arguments. The filter/sort/paging context is passed to every
// render explicitly, so rendering several subjects never compounds filters.

mod filter;
pub mod sql;

use crate::dictionary::DictionarySnapshot;
use crate::errors::ComposeError;
use crate::models::{ExecuteRequest, Filter, SortSpec};
use crate::template::Template;
use crate::token::{parse_params, TokenContext, TokenRegistry};
use regex::Regex;
use serde_json::Value;
use sql::Dialect;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::OnceLock;

/// Placeholder rendering `WHERE <predicates>`
pub const WHERE_PLACEHOLDER: &str = "where";
/// Placeholder rendering `AND <predicates>`, for skeletons that already filter
pub const AND_WHERE_PLACEHOLDER: &str = "and_where";
pub const ORDER_BY_PLACEHOLDER: &str = "order_by";
pub const LIMIT_PLACEHOLDER: &str = "limit";

/// Pipeline every request enables; a no-op until a hook is installed
pub const FULLTEXT_PIPELINE: &str = "fulltext";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(([^(){}]*)\))?\s*\}\}")
            .expect("Invalid regex pattern")
    })
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        WHERE_PLACEHOLDER | AND_WHERE_PLACEHOLDER | ORDER_BY_PLACEHOLDER | LIMIT_PLACEHOLDER
    )
}

/// How the filters of one group are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterGroup {
    pub combinator: Combinator,
    pub filters: Vec<Filter>,
}

/// Offset/limit pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub offset: u64,
    pub limit: u64,
}

impl Limit {
    /// Pagination for a 1-based page. A non-positive page limit means no
    /// pagination; a non-positive page index is treated as page 1.
    pub fn from_page(page_index: i64, page_limit: i64) -> Option<Self> {
        if page_limit <= 0 {
            return None;
        }
        let limit = page_limit as u64;
        let page = page_index.max(1) as u64;
        Some(Self {
            offset: (page - 1).saturating_mul(limit),
            limit,
        })
    }
}

/// Filters, ordering and pagination shared by every subject of a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContext {
    groups: Vec<FilterGroup>,
    sorts: Vec<SortSpec>,
    limit: Option<Limit>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller filters AND-combined, ordering, and page-derived pagination
    pub fn from_request(request: &ExecuteRequest) -> Self {
        let mut context = Self::new();
        context
            .add_filters(request.filters.clone(), Combinator::And)
            .set_order_by(request.sorts.clone());
        if let Some(limit) = Limit::from_page(request.page_index, request.page_limit) {
            context.set_limit(limit.offset, limit.limit);
        }
        context
    }

    /// Append a filter group; groups are joined with AND
    pub fn add_filters(&mut self, filters: Vec<Filter>, combinator: Combinator) -> &mut Self {
        if !filters.is_empty() {
            self.groups.push(FilterGroup {
                combinator,
                filters,
            });
        }
        self
    }

    /// Replace any previously set pagination
    pub fn set_limit(&mut self, offset: u64, limit: u64) -> &mut Self {
        self.limit = Some(Limit { offset, limit });
        self
    }

    /// Replace the ordering; an empty sequence means no ordering
    pub fn set_order_by(&mut self, sorts: Vec<SortSpec>) -> &mut Self {
        self.sorts = sorts;
        self
    }

    pub fn filter_groups(&self) -> &[FilterGroup] {
        &self.groups
    }

    pub fn sorts(&self) -> &[SortSpec] {
        &self.sorts
    }

    pub fn limit(&self) -> Option<Limit> {
        self.limit
    }
}

/// A rendered statement and its positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStatement {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Renders the subjects of one template for one target connection
pub struct Composer<'a> {
    template: &'a Template,
    registry: &'a TokenRegistry,
    dialect: Dialect,
    dictionary: Option<DictionarySnapshot>,
    pipelines: Vec<String>,
}

impl<'a> Composer<'a> {
    pub fn new(template: &'a Template, registry: &'a TokenRegistry, dialect: Dialect) -> Self {
        let mut composer = Self {
            template,
            registry,
            dialect,
            dictionary: None,
            pipelines: Vec::new(),
        };
        for name in &template.pipelines {
            composer.enable_pipeline(name.as_str());
        }
        composer
    }

    /// Enable a named pipeline extension point
    pub fn enable_pipeline(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.pipelines.contains(&name) {
            self.pipelines.push(name);
        }
        self
    }

    pub fn set_dictionary(&mut self, dictionary: DictionarySnapshot) -> &mut Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Names of every token the template's subjects invoke
    pub fn referenced_tokens(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for sql in self.template.composition.subject.values() {
            let spans = sql::code_spans(sql, self.dialect);
            for caps in placeholder_pattern().captures_iter(sql) {
                if caps.get(0).map_or(true, |m| !sql::in_code(&spans, m.start())) {
                    continue;
                }
                let name = &caps[1];
                if caps.get(2).is_some() || !is_reserved(name) {
                    names.insert(name.to_string());
                }
            }
        }
        names
    }

    /// True when any referenced token reads the attribute dictionary
    pub fn needs_dictionary(&self) -> bool {
        self.referenced_tokens()
            .iter()
            .any(|name| self.registry.uses_dictionary(name))
    }

    /// Render one subject under the given context
    #[tracing::instrument(skip(self, context), fields(dialect = ?self.dialect))]
    pub fn render(
        &self,
        subject: &str,
        context: &QueryContext,
    ) -> Result<RenderedStatement, ComposeError> {
        let skeleton = self
            .template
            .subject(subject)
            .ok_or_else(|| ComposeError::UnknownSubject(subject.to_string()))?;

        let spans = sql::code_spans(skeleton, self.dialect);
        let mut sql = String::with_capacity(skeleton.len());
        let mut args = Vec::new();
        let mut last = 0;

        for caps in placeholder_pattern().captures_iter(skeleton) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            // Inside a string literal or comment the text is kept verbatim
            if !sql::in_code(&spans, whole.start()) {
                continue;
            }
            check_literal(skeleton, last..whole.start(), &spans)?;
            sql.push_str(&skeleton[last..whole.start()]);
            last = whole.end();

            let name = &caps[1];
            match caps.get(2) {
                None if is_reserved(name) => {
                    sql.push_str(&self.render_placeholder(name, context, &mut args)?);
                }
                Some(_) if is_reserved(name) => {
                    return Err(ComposeError::MalformedPlaceholder(whole.as_str().to_string()));
                }
                params => {
                    let params = parse_params(params.map(|p| p.as_str()).unwrap_or(""))
                        .map_err(|_| ComposeError::MalformedPlaceholder(whole.as_str().to_string()))?;
                    let token_context = TokenContext {
                        dictionary: self.dictionary.as_deref(),
                    };
                    sql.push_str(&self.registry.resolve(name, &params, &token_context)?);
                }
            }
        }
        check_literal(skeleton, last..skeleton.len(), &spans)?;
        sql.push_str(&skeleton[last..]);

        let mut statement = RenderedStatement {
            sql: sql.trim().to_string(),
            args,
        };

        for name in &self.pipelines {
            if let Some(hook) = self.registry.pipeline(name) {
                statement = hook(statement).map_err(|reason| ComposeError::PipelineFailed {
                    name: name.clone(),
                    reason,
                })?;
            }
        }

        self.rebind(statement)
    }

    fn render_placeholder(
        &self,
        name: &str,
        context: &QueryContext,
        args: &mut Vec<Value>,
    ) -> Result<String, ComposeError> {
        let text = match name {
            WHERE_PLACEHOLDER | AND_WHERE_PLACEHOLDER => {
                match filter::render_predicates(self.template, context.filter_groups(), args)? {
                    Some(predicate) if name == WHERE_PLACEHOLDER => format!("WHERE {}", predicate),
                    Some(predicate) => format!("AND {}", predicate),
                    None => String::new(),
                }
            }
            ORDER_BY_PLACEHOLDER => filter::render_order_by(self.template, context.sorts())?,
            LIMIT_PLACEHOLDER => match context.limit() {
                Some(limit) => {
                    args.push(Value::from(limit.limit));
                    args.push(Value::from(limit.offset));
                    "LIMIT ? OFFSET ?".to_string()
                }
                None => String::new(),
            },
            other => return Err(ComposeError::MalformedPlaceholder(other.to_string())),
        };
        Ok(text)
    }

    /// Adapt generic placeholders to the target convention
    fn rebind(&self, statement: RenderedStatement) -> Result<RenderedStatement, ComposeError> {
        let (sql, placeholders) = sql::rebind(&statement.sql, self.dialect);
        if placeholders != statement.args.len() {
            return Err(ComposeError::PlaceholderMismatch {
                placeholders,
                arguments: statement.args.len(),
            });
        }
        Ok(RenderedStatement {
            sql,
            args: statement.args,
        })
    }
}

/// Literal template text must not contain stray placeholder braces outside
/// string literals and comments
fn check_literal(
    skeleton: &str,
    range: Range<usize>,
    spans: &[Range<usize>],
) -> Result<(), ComposeError> {
    for marker in ["{{", "}}"] {
        for (offset, _) in skeleton[range.clone()].match_indices(marker) {
            let pos = range.start + offset;
            if sql::in_code(spans, pos) {
                let snippet: String = skeleton[pos..].chars().take(32).collect();
                return Err(ComposeError::MalformedPlaceholder(snippet));
            }
        }
    }
    Ok(())
}
