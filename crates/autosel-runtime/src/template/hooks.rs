use hashbrown::HashMap;

use super::TemplateError;

/// A deferred source-fragment generator, invoked exactly once at finalize.
pub type HookFn = Box<dyn FnOnce() -> String + Send>;

/// Pending placeholder tokens of a render, mapped to their resolvers.
///
/// A generator that cannot emit its fragment during template evaluation
/// (because it depends on state collected across the whole template, like the
/// kernel signature) registers a resolver here and writes the token into the
/// text instead. Every registered token must be resolved before the final
/// source is assembled.
#[derive(Default)]
pub struct HookTable {
    hooks: HashMap<String, HookFn>,
}

impl core::fmt::Debug for HookTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HookTable")
            .field("pending", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HookTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver under a placeholder token such as `<STORE_OUTPUT>`.
    ///
    /// Registering the same token twice is an error: a resolver runs exactly
    /// once and a token can only be substituted by one fragment.
    pub fn register(
        &mut self,
        token: impl Into<String>,
        hook: impl FnOnce() -> String + Send + 'static,
    ) -> Result<(), TemplateError> {
        let token = token.into();
        debug_assert!(is_hook_token(&token), "malformed hook token: {token}");
        if self.hooks.contains_key(&token) {
            return Err(TemplateError::DuplicateHook(token));
        }
        self.hooks.insert(token, Box::new(hook));
        Ok(())
    }

    /// Whether a resolver is registered for the token.
    pub fn is_registered(&self, token: &str) -> bool {
        self.hooks.contains_key(token)
    }

    /// Number of pending resolvers.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no resolver is pending.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn take(&mut self, token: &str) -> Option<HookFn> {
        self.hooks.remove(token)
    }

    fn drain(&mut self) -> Vec<(String, HookFn)> {
        self.hooks.drain().collect()
    }
}

/// Rendered template text plus the pending tokens still to be resolved.
///
/// Phase one of a render produces this value; phase two substitutes every
/// pending token by invoking its resolver, either one by one with
/// [`finalize_hook`](Self::finalize_hook) or all at once with
/// [`finalize_all`](Self::finalize_all).
#[derive(Debug)]
pub struct PartialRender {
    code: String,
    hooks: HookTable,
}

impl PartialRender {
    /// Wrap phase-one output.
    pub fn new(code: String, hooks: HookTable) -> Self {
        Self { code, hooks }
    }

    /// The text as rendered so far, pending tokens included.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Resolve a single pending token by name.
    ///
    /// Errors if no resolver is registered under the token or if the token
    /// does not appear in the text (a hook that is registered but never
    /// referenced is a programming error).
    pub fn finalize_hook(&mut self, token: &str) -> Result<(), TemplateError> {
        let hook = self
            .hooks
            .take(token)
            .ok_or_else(|| TemplateError::UnresolvedHook(token.to_string()))?;

        if !self.code.contains(token) {
            return Err(TemplateError::UnresolvedHook(token.to_string()));
        }

        self.code = self.code.replace(token, &hook());
        Ok(())
    }

    /// Resolve every pending token and return the final source.
    ///
    /// Errors if any registered hook has no token left in the text, or if any
    /// token-shaped placeholder remains in the text afterwards.
    pub fn finalize_all(mut self) -> Result<String, TemplateError> {
        for (token, hook) in self.hooks.drain() {
            if !self.code.contains(&token) {
                return Err(TemplateError::UnresolvedHook(token));
            }
            self.code = self.code.replace(&token, &hook());
        }

        if let Some(token) = find_hook_token(&self.code) {
            return Err(TemplateError::UnresolvedHook(token));
        }

        Ok(self.code)
    }
}

/// Whether the string is a well-formed placeholder token: `<NAME>` with an
/// upper-case identifier inside.
pub fn is_hook_token(token: &str) -> bool {
    let inner = match token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        Some(inner) => inner,
        None => return false,
    };
    !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Find the first placeholder-shaped token left in the text, if any.
fn find_hook_token(code: &str) -> Option<String> {
    let bytes = code.as_bytes();
    let mut start = None;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'<' => start = Some(i),
            b'>' => {
                if let Some(s) = start.take() {
                    let candidate = &code[s..=i];
                    if is_hook_token(candidate) {
                        return Some(candidate.to_string());
                    }
                }
            }
            b if b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_' => {}
            _ => start = None,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_all_resolves_tokens() {
        let mut hooks = HookTable::new();
        hooks.register("<BODY>", || "x += 1;".to_string()).unwrap();

        let render = PartialRender::new("void k() { <BODY> }".to_string(), hooks);
        let code = render.finalize_all().unwrap();
        assert_eq!(code, "void k() { x += 1; }");
    }

    #[test]
    fn test_finalize_hook_then_all() {
        let mut hooks = HookTable::new();
        hooks.register("<A>", || "a".to_string()).unwrap();
        hooks.register("<B>", || "b".to_string()).unwrap();

        let mut render = PartialRender::new("<A> <B>".to_string(), hooks);
        render.finalize_hook("<A>").unwrap();
        assert_eq!(render.code(), "a <B>");
        assert_eq!(render.finalize_all().unwrap(), "a b");
    }

    #[test]
    fn test_unreferenced_hook_is_an_error() {
        let mut hooks = HookTable::new();
        hooks.register("<GONE>", || "nope".to_string()).unwrap();

        let render = PartialRender::new("no token here".to_string(), hooks);
        assert_eq!(
            render.finalize_all(),
            Err(TemplateError::UnresolvedHook("<GONE>".to_string()))
        );
    }

    #[test]
    fn test_leftover_token_is_an_error() {
        let render = PartialRender::new("body <ORPHAN> end".to_string(), HookTable::new());
        assert_eq!(
            render.finalize_all(),
            Err(TemplateError::UnresolvedHook("<ORPHAN>".to_string()))
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut hooks = HookTable::new();
        hooks.register("<X>", || "1".to_string()).unwrap();
        assert_eq!(
            hooks.register("<X>", || "2".to_string()),
            Err(TemplateError::DuplicateHook("<X>".to_string()))
        );
    }

    #[test]
    fn test_comparison_operators_are_not_tokens() {
        let render = PartialRender::new("if (a < B && B > c) {}".to_string(), HookTable::new());
        assert!(render.finalize_all().is_ok());
    }
}
