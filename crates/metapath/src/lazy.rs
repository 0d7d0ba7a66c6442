//! Deferred compilation and a shared cache of compiled expressions.

use crate::compile::MetapathExpression;
use crate::context::{DynamicContext, StaticContext};
use crate::error::MetapathError;
use crate::types::{Item, Sequence};
use log::debug;
use metaschema_mdm::NodeItem;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// Expression text that is compiled on first use.
///
/// Construction only stores the text. The first call that needs the compiled form parses
/// and checks it; the outcome, including a compilation error, is cached and shared by
/// every later call and every thread.
pub struct LazyExpression {
    text: String,
    static_context: StaticContext,
    compiled: OnceLock<Result<MetapathExpression, MetapathError>>,
}

impl fmt::Debug for LazyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyExpression")
            .field("text", &self.text)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

impl LazyExpression {
    pub fn new(text: impl Into<String>, static_context: StaticContext) -> Self {
        Self {
            text: text.into(),
            static_context,
            compiled: OnceLock::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// The compiled expression, compiling it now if this is the first use.
    pub fn compiled(&self) -> Result<&MetapathExpression, MetapathError> {
        self.compiled
            .get_or_init(|| {
                debug!("compiling metapath '{}' on first use", self.text);
                MetapathExpression::compile(&self.text, &self.static_context)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn evaluate<N: NodeItem>(
        &self,
        focus: Option<Item<N>>,
        dynamic: &DynamicContext<N>,
    ) -> Result<Sequence<N>, MetapathError> {
        self.compiled()?.evaluate(focus, dynamic)
    }

    pub fn evaluate_boolean<N: NodeItem>(
        &self,
        focus: Option<Item<N>>,
        dynamic: &DynamicContext<N>,
    ) -> Result<bool, MetapathError> {
        self.compiled()?.evaluate_boolean(focus, dynamic)
    }
}

/// Compiled expressions keyed by their text, for callers that compile the same snippets
/// over and over against one static context.
pub struct ExpressionCache {
    static_context: StaticContext,
    entries: RwLock<HashMap<String, Arc<MetapathExpression>>>,
}

impl fmt::Debug for ExpressionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionCache")
            .field("len", &self.len())
            .finish()
    }
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(StaticContext::default())
    }
}

impl ExpressionCache {
    pub fn new(static_context: StaticContext) -> Self {
        Self {
            static_context,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The compiled form of `text`, compiling and inserting it on a miss. Failed
    /// compilations are not cached.
    pub fn get_or_compile(&self, text: &str) -> Result<Arc<MetapathExpression>, MetapathError> {
        {
            let entries = self
                .entries
                .read()
                .map_err(|_| MetapathError::usage("expression cache lock poisoned"))?;
            if let Some(cached) = entries.get(text) {
                return Ok(Arc::clone(cached));
            }
        }
        debug!("expression cache miss for '{}'", text);
        let compiled = Arc::new(MetapathExpression::compile(text, &self.static_context)?);
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MetapathError::usage("expression cache lock poisoned"))?;
        // a racing thread may have inserted first; keep its entry so all callers agree
        Ok(Arc::clone(
            entries.entry(text.to_string()).or_insert(compiled),
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::NodeRef;
    use std::thread;

    #[test]
    fn test_invalid_text_fails_on_first_evaluation() {
        let lazy = LazyExpression::new("1 +", StaticContext::default());
        assert!(!lazy.is_compiled());
        let dynamic = DynamicContext::<NodeRef>::new();
        let err = lazy.evaluate(None, &dynamic).unwrap_err();
        assert!(matches!(err, MetapathError::Syntax { .. }));
        assert!(lazy.is_compiled());
        // the cached failure is reported again
        assert_eq!(lazy.evaluate(None, &dynamic).unwrap_err(), err);
    }

    #[test]
    fn test_compiles_once_across_threads() {
        let lazy = Arc::new(LazyExpression::new("1 + 2", StaticContext::default()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                thread::spawn(move || {
                    let dynamic = DynamicContext::<NodeRef>::new();
                    lazy.evaluate(None, &dynamic).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Sequence::from_integer(3));
        }
        let first = lazy.compiled().unwrap() as *const MetapathExpression;
        let second = lazy.compiled().unwrap() as *const MetapathExpression;
        assert_eq!(first, second);
    }

    #[test]
    fn test_cache_returns_shared_entries() {
        let cache = ExpressionCache::default();
        let a = cache.get_or_compile("count(1 to 3)").unwrap();
        let b = cache.get_or_compile("count(1 to 3)").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(cache.get_or_compile("(").is_err());
        assert_eq!(cache.len(), 1);
    }
}
