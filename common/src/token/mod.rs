// Token registry: named, parameterized macros expanded to SQL text
//
// A token occurrence `{{ name(k=v, ...) }}` is resolved by calling the
// factory registered under `name` with the parsed parameters, then calling
// the returned replacer. Replacer output is substituted verbatim before
// parameter binding, so it must only ever carry schema-shape fragments.

pub mod attrs;

use crate::composer::RenderedStatement;
use crate::config::AttributeConfig;
use crate::errors::{ComposeError, TokenError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One `name=value` pair of a token invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenParam {
    pub name: String,
    pub value: String,
}

impl TokenParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parse the text between the parentheses of a token invocation
pub fn parse_params(raw: &str) -> Result<Vec<TokenParam>, TokenError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    raw.split(',')
        .map(|pair| {
            let pair = pair.trim();
            let (name, value) = pair.split_once('=').ok_or_else(|| TokenError::InvalidParameter {
                name: pair.to_string(),
                reason: "expected name=value".to_string(),
            })?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                return Err(TokenError::InvalidParameter {
                    name: pair.to_string(),
                    reason: "name and value must be non-empty".to_string(),
                });
            }
            Ok(TokenParam::new(name, value))
        })
        .collect()
}

/// Read-only state a replacer may consult at render time
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenContext<'a> {
    pub dictionary: Option<&'a HashMap<String, String>>,
}

pub type Replacer = Box<dyn Fn(&TokenContext<'_>) -> Result<String, TokenError> + Send + Sync>;

pub type TokenFactory =
    Arc<dyn Fn(&[TokenParam]) -> Result<Replacer, TokenError> + Send + Sync>;

/// Post-render statement transformation, applied before rebinding
pub type PipelineHook =
    Arc<dyn Fn(RenderedStatement) -> Result<RenderedStatement, String> + Send + Sync>;

#[derive(Clone)]
struct TokenEntry {
    factory: TokenFactory,
    uses_dictionary: bool,
}

/// Registry of token factories and pipeline hooks
///
/// Mutated while the process starts up, shared read-only behind an `Arc`
/// afterwards.
#[derive(Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenEntry>,
    pipelines: HashMap<String, PipelineHook>,
}

impl fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<&String> = self.tokens.keys().collect();
        tokens.sort();
        let mut pipelines: Vec<&String> = self.pipelines.keys().collect();
        pipelines.sort();
        f.debug_struct("TokenRegistry")
            .field("tokens", &tokens)
            .field("pipelines", &pipelines)
            .finish()
    }
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the attribute join/select tokens installed
    pub fn with_standard_tokens(config: &AttributeConfig) -> Self {
        let mut registry = Self::new();
        attrs::register(&mut registry, config);
        registry
    }

    /// Register a token factory; a later registration under the same name wins
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&[TokenParam]) -> Result<Replacer, TokenError> + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(factory), false);
    }

    /// Register a token whose replacer reads the attribute dictionary
    pub fn register_dictionary_token<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&[TokenParam]) -> Result<Replacer, TokenError> + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(factory), true);
    }

    fn insert(&mut self, name: String, factory: TokenFactory, uses_dictionary: bool) {
        if self.tokens.contains_key(&name) {
            tracing::debug!(token = %name, "Replacing token registration");
        }
        self.tokens.insert(
            name,
            TokenEntry {
                factory,
                uses_dictionary,
            },
        );
    }

    /// Install the hook behind a named pipeline extension point
    pub fn install_pipeline<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(RenderedStatement) -> Result<RenderedStatement, String> + Send + Sync + 'static,
    {
        self.pipelines.insert(name.into(), Arc::new(hook));
    }

    pub fn uses_dictionary(&self, name: &str) -> bool {
        self.tokens
            .get(name)
            .map(|entry| entry.uses_dictionary)
            .unwrap_or(false)
    }

    pub fn pipeline(&self, name: &str) -> Option<&PipelineHook> {
        self.pipelines.get(name)
    }

    /// Expand one token invocation to SQL text
    pub fn resolve(
        &self,
        name: &str,
        params: &[TokenParam],
        context: &TokenContext<'_>,
    ) -> Result<String, ComposeError> {
        let entry = self
            .tokens
            .get(name)
            .ok_or_else(|| ComposeError::UnresolvedToken(name.to_string()))?;

        let token_failed = |source: TokenError| ComposeError::TokenFailed {
            name: name.to_string(),
            source,
        };

        let replacer = (entry.factory)(params).map_err(token_failed)?;
        replacer(context).map_err(token_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(text: &'static str) -> impl Fn(&[TokenParam]) -> Result<Replacer, TokenError> {
        move |_params: &[TokenParam]| {
            let replacer: Replacer = Box::new(move |_ctx| Ok(text.to_string()));
            Ok(replacer)
        }
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params(" color = Color , size-code=Size").unwrap();
        assert_eq!(
            params,
            vec![
                TokenParam::new("color", "Color"),
                TokenParam::new("size-code", "Size")
            ]
        );
        assert!(parse_params("").unwrap().is_empty());
        assert!(parse_params("color").is_err());
        assert!(parse_params("color=").is_err());
        assert!(parse_params("a=b,").is_err());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = TokenRegistry::new();
        registry.register("t", constant("first"));
        registry.register("t", constant("second"));

        let text = registry
            .resolve("t", &[], &TokenContext::default())
            .unwrap();
        assert_eq!(text, "second");
    }

    #[test]
    fn test_unknown_token_is_unresolved() {
        let registry = TokenRegistry::new();
        let err = registry
            .resolve("missing", &[], &TokenContext::default())
            .unwrap_err();
        assert_eq!(err, ComposeError::UnresolvedToken("missing".to_string()));
    }

    #[test]
    fn test_factory_errors_are_token_failures() {
        let mut registry = TokenRegistry::new();
        registry.register("strict", |params: &[TokenParam]| {
            if params.is_empty() {
                return Err(TokenError::InvalidParameter {
                    name: "strict".to_string(),
                    reason: "needs params".to_string(),
                });
            }
            let replacer: Replacer = Box::new(|_ctx| Ok(String::new()));
            Ok(replacer)
        });

        let err = registry
            .resolve("strict", &[], &TokenContext::default())
            .unwrap_err();
        assert!(err.is_token_failure());
    }

    #[test]
    fn test_standard_tokens_use_dictionary() {
        let registry = TokenRegistry::with_standard_tokens(&AttributeConfig::default());
        assert!(registry.uses_dictionary(attrs::ATTRS_TOKEN));
        assert!(!registry.uses_dictionary(attrs::ATTRS_FIELDS_TOKEN));
        assert!(!registry.uses_dictionary("missing"));
    }
}
