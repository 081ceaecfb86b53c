//! Session container parameterized over a [`ProblemType`].

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use super::problem_type::{InvalidationPolicy, ProblemType};
use super::types::{ExportRecord, LogEntry, SessionMetadata};

/// Mutable container for one calibration attempt.
///
/// - The config is always present and starts at `P::Config::default()`.
/// - Replacing the input applies [`ProblemType::on_input_change`].
/// - Replacing the config applies [`ProblemType::on_config_change`].
/// - Exports accumulate; each one is a snapshot of the output at export time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "P: ProblemType")]
pub struct CalibrationSession<P: ProblemType> {
    pub metadata: SessionMetadata,
    pub config: P::Config,
    input: Option<P::Input>,
    pub state: P::State,
    output: Option<P::Output>,
    pub exports: Vec<ExportRecord<P::Export>>,
    pub log: Vec<LogEntry>,
}

impl<P: ProblemType> CalibrationSession<P> {
    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    pub fn new() -> Self {
        Self::from_metadata(SessionMetadata::new(P::name(), P::schema_version()))
    }

    pub fn with_description(description: impl Into<String>) -> Self {
        Self::from_metadata(SessionMetadata::with_description(
            P::name(),
            P::schema_version(),
            description,
        ))
    }

    /// New session with validated input.
    pub fn with_input(input: P::Input) -> Result<Self> {
        let mut session = Self::new();
        session.set_input(input)?;
        Ok(session)
    }

    fn from_metadata(metadata: SessionMetadata) -> Self {
        Self {
            metadata,
            config: P::Config::default(),
            input: None,
            state: P::State::default(),
            output: None,
            exports: Vec::new(),
            log: Vec::new(),
        }
    }

    fn invalidate(&mut self, policy: InvalidationPolicy) {
        if policy.clear_state {
            self.state = P::State::default();
        }
        if policy.clear_output {
            self.output = None;
        }
        if policy.clear_exports {
            self.exports.clear();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Input
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate and store new input.
    ///
    /// # Errors
    ///
    /// Returns the [`ProblemType::validate_input`] error; the session is left
    /// untouched in that case.
    pub fn set_input(&mut self, input: P::Input) -> Result<()> {
        P::validate_input(&input)?;
        self.invalidate(P::on_input_change());
        self.input = Some(input);
        self.metadata.touch();
        Ok(())
    }

    pub fn input(&self) -> Option<&P::Input> {
        self.input.as_ref()
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// # Errors
    ///
    /// Fails if no input has been set.
    pub fn require_input(&self) -> Result<&P::Input> {
        self.input.as_ref().ok_or_else(|| anyhow!("input not set"))
    }

    pub fn clear_input(&mut self) {
        self.invalidate(P::on_input_change());
        self.input = None;
        self.metadata.touch();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Config
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate and store a new config.
    pub fn set_config(&mut self, config: P::Config) -> Result<()> {
        P::validate_config(&config)?;
        self.invalidate(P::on_config_change());
        self.config = config;
        self.metadata.touch();
        Ok(())
    }

    /// Edit a copy of the config in place, then apply it through [`Self::set_config`].
    pub fn update_config<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut P::Config),
    {
        let mut config = self.config.clone();
        f(&mut config);
        self.set_config(config)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Output
    // ─────────────────────────────────────────────────────────────────────────

    pub fn output(&self) -> Option<&P::Output> {
        self.output.as_ref()
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// # Errors
    ///
    /// Fails if no step has produced an output yet.
    pub fn require_output(&self) -> Result<&P::Output> {
        self.output
            .as_ref()
            .ok_or_else(|| anyhow!("output not computed"))
    }

    pub fn set_output(&mut self, output: P::Output) {
        self.output = Some(output);
        self.metadata.touch();
    }

    pub fn clear_output(&mut self) {
        self.output = None;
        self.metadata.touch();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────

    /// Convert the output and append it to [`Self::exports`].
    pub fn export(&mut self) -> Result<P::Export> {
        let export = self.export_peek()?;
        self.exports.push(ExportRecord::new(export.clone()));
        self.metadata.touch();
        Ok(export)
    }

    pub fn export_with_notes(&mut self, notes: impl Into<String>) -> Result<P::Export> {
        let export = self.export_peek()?;
        self.exports
            .push(ExportRecord::with_notes(export.clone(), notes));
        self.metadata.touch();
        Ok(export)
    }

    /// Convert the output without recording it.
    pub fn export_peek(&self) -> Result<P::Export> {
        P::export(self.require_output()?, &self.config)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Check input, config and their combination.
    pub fn validate(&self) -> Result<()> {
        let input = self.require_input()?;
        P::validate_input(input)?;
        P::validate_config(&self.config)?;
        P::validate_input_config(input, &self.config)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operation log
    // ─────────────────────────────────────────────────────────────────────────

    pub fn log_success(&mut self, operation: impl Into<String>) {
        self.log.push(LogEntry::success(operation));
        self.metadata.touch();
    }

    pub fn log_success_with_notes(
        &mut self,
        operation: impl Into<String>,
        notes: impl Into<String>,
    ) {
        self.log.push(LogEntry::success_with_notes(operation, notes));
        self.metadata.touch();
    }

    pub fn log_failure(&mut self, operation: impl Into<String>, error: impl Into<String>) {
        self.log.push(LogEntry::failure(operation, error));
        self.metadata.touch();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reset
    // ─────────────────────────────────────────────────────────────────────────

    pub fn reset_state(&mut self) {
        self.state = P::State::default();
        self.metadata.touch();
    }

    /// Drop everything except config and metadata.
    pub fn reset(&mut self) {
        self.invalidate(InvalidationPolicy::CLEAR_ALL);
        self.input = None;
        self.log.clear();
        self.metadata.touch();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a session, rejecting schemas newer than `P::schema_version()`.
    pub fn from_json(json: &str) -> Result<Self> {
        let session: Self = serde_json::from_str(json)?;
        if session.metadata.problem_type != P::name() {
            bail!(
                "session is for problem {:?}, expected {:?}",
                session.metadata.problem_type,
                P::name()
            );
        }
        if session.metadata.schema_version > P::schema_version() {
            bail!(
                "session schema version {} is newer than supported version {}",
                session.metadata.schema_version,
                P::schema_version()
            );
        }
        Ok(session)
    }
}

impl<P: ProblemType> Default for CalibrationSession<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct CountConfig {
        limit: usize,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct CountInput {
        values: Vec<i64>,
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct CountState {
        seen: usize,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct CountOutput {
        total: i64,
    }

    #[derive(Debug)]
    struct CountProblem;

    impl ProblemType for CountProblem {
        type Config = CountConfig;
        type Input = CountInput;
        type State = CountState;
        type Output = CountOutput;
        type Export = i64;

        fn name() -> &'static str {
            "count"
        }

        fn schema_version() -> u32 {
            2
        }

        fn validate_input(input: &Self::Input) -> Result<()> {
            if input.values.is_empty() {
                bail!("no values");
            }
            Ok(())
        }

        fn export(output: &Self::Output, _config: &Self::Config) -> Result<Self::Export> {
            Ok(output.total)
        }
    }

    fn input() -> CountInput {
        CountInput {
            values: vec![1, 2, 3],
        }
    }

    #[test]
    fn rejected_input_leaves_session_untouched() {
        let mut session = CalibrationSession::<CountProblem>::new();
        session.state.seen = 4;
        let err = session.set_input(CountInput { values: vec![] }).unwrap_err();
        assert!(err.to_string().contains("no values"));
        assert!(!session.has_input());
        assert_eq!(session.state.seen, 4);
    }

    #[test]
    fn new_input_clears_computed_results() {
        let mut session = CalibrationSession::<CountProblem>::with_input(input()).unwrap();
        session.state.seen = 3;
        session.set_output(CountOutput { total: 6 });
        session.export().unwrap();

        session.set_input(input()).unwrap();
        assert_eq!(session.state.seen, 0);
        assert!(!session.has_output());
        assert_eq!(session.exports.len(), 1);
    }

    #[test]
    fn config_change_keeps_output() {
        let mut session = CalibrationSession::<CountProblem>::with_input(input()).unwrap();
        session.set_output(CountOutput { total: 6 });
        session.update_config(|c| c.limit = 10).unwrap();
        assert_eq!(session.config.limit, 10);
        assert!(session.has_output());
    }

    #[test]
    fn export_requires_output() {
        let mut session = CalibrationSession::<CountProblem>::new();
        assert!(session.export().is_err());
        session.set_output(CountOutput { total: 6 });
        assert_eq!(session.export_peek().unwrap(), 6);
        assert!(session.exports.is_empty());
        assert_eq!(session.export_with_notes("first").unwrap(), 6);
        assert_eq!(session.exports[0].notes.as_deref(), Some("first"));
    }

    #[test]
    fn reset_keeps_config() {
        let mut session = CalibrationSession::<CountProblem>::with_input(input()).unwrap();
        session.config.limit = 5;
        session.log_success("count");
        session.reset();
        assert!(!session.has_input());
        assert!(session.log.is_empty());
        assert_eq!(session.config.limit, 5);
    }

    #[test]
    fn json_roundtrip_and_schema_check() {
        let mut session = CalibrationSession::<CountProblem>::with_description("three values");
        session.set_input(input()).unwrap();
        session.set_output(CountOutput { total: 6 });
        session.log_failure("count", "interrupted");

        let json = session.to_json().unwrap();
        let restored = CalibrationSession::<CountProblem>::from_json(&json).unwrap();
        assert_eq!(restored.require_input().unwrap().values, vec![1, 2, 3]);
        assert_eq!(restored.require_output().unwrap().total, 6);
        assert_eq!(restored.log.len(), 1);
        assert!(!restored.log[0].success);

        let newer = json.replace("\"schema_version\": 2", "\"schema_version\": 3");
        assert!(CalibrationSession::<CountProblem>::from_json(&newer).is_err());

        let other = json.replace("\"problem_type\": \"count\"", "\"problem_type\": \"other\"");
        assert!(CalibrationSession::<CountProblem>::from_json(&other).is_err());
    }
}
