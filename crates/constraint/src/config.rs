/// Options for one validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Record a `Pass` finding for every target that satisfies its constraint.
    ///
    /// Defaults to `false`: only violations and evaluation errors are recorded.
    pub generate_pass_findings: bool,
    /// Stop the run at the first constraint that cannot be evaluated instead of recording
    /// an error finding and moving on.
    ///
    /// Defaults to `false`.
    pub fail_on_evaluation_error: bool,
    /// Finding messages longer than this many characters are cut and suffixed with `...`.
    ///
    /// Defaults to `None` (no limit).
    pub max_message_length: Option<usize>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            generate_pass_findings: false,
            fail_on_evaluation_error: false,
            max_message_length: None,
        }
    }
}
