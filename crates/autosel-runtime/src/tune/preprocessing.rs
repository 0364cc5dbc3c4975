use std::sync::Arc;

/// A candidate-list filter applied before benchmarking.
///
/// Each function receives the current choice list and returns a new one of
/// arbitrary size, including empty or singleton. Functions may have external
/// side effects.
pub type PreprocessingFn<C> = Arc<dyn Fn(Vec<C>) -> Vec<C> + Send + Sync>;

/// Ordered list of preprocessing functions, applied in registration order.
pub struct PreprocessingFns<C> {
    fns: Vec<PreprocessingFn<C>>,
}

impl<C> Default for PreprocessingFns<C> {
    fn default() -> Self {
        Self { fns: Vec::new() }
    }
}

impl<C> PreprocessingFns<C> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a preprocessing function; it runs after all previously
    /// registered ones.
    pub fn add(&mut self, f: impl Fn(Vec<C>) -> Vec<C> + Send + Sync + 'static) {
        self.fns.push(Arc::new(f));
    }

    /// Remove every registered function.
    pub fn clear(&mut self) {
        self.fns.clear();
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.fns.len()
    }

    /// Whether no function is registered.
    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }

    /// Thread the choice list through every registered function in order.
    pub fn apply(&self, mut choices: Vec<C>) -> Vec<C> {
        for f in &self.fns {
            choices = f(choices);
        }
        choices
    }
}
