/// Interpreter limits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// How deep word calls, branches and loop bodies may nest before
    /// evaluation fails with `ForthError::RecursionLimit`.
    pub max_depth: usize,
}

impl Config {
    pub const DEFAULT_MAX_DEPTH: usize = 200;
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}
