//! Per-cycle outcome aggregation.

pub const RESUMED_HEADER: &str =
    "The following volumes were found suspended and have been resumed:";
pub const FAILED_HEADER: &str =
    "The following volumes could not be resumed and will be retried:";

/// What one remediation cycle did, in display-name form. Built fresh each
/// cycle and consumed by exactly one notification.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub resumed: Vec<String>,
    pub failed: Vec<String>,
}

impl CycleOutcome {
    pub fn is_empty(&self) -> bool {
        self.resumed.is_empty() && self.failed.is_empty()
    }
}

/// Renders the outcome as a notification body: one section per non-empty
/// list, a header line followed by one volume per line.
pub fn build(outcome: &CycleOutcome) -> String {
    let mut sections = Vec::new();
    if !outcome.resumed.is_empty() {
        sections.push(format!("{}\n{}", RESUMED_HEADER, outcome.resumed.join("\n")));
    }
    if !outcome.failed.is_empty() {
        sections.push(format!("{}\n{}", FAILED_HEADER, outcome.failed.join("\n")));
    }
    if sections.is_empty() {
        String::new()
    } else {
        sections.join("\n\n") + "\n"
    }
}
