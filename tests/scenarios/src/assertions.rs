//! Assertion helpers for scenarios.
//!
//! These are pure functions over recorded observations. They take state as
//! input and return pass/fail with details.

use std::collections::HashMap;

use cluster_disrupt::LinkState;

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }
}

/// Assert that no port appears in two of the given blocks.
///
/// Each block is the port list of one outstanding reservation.
pub fn assert_disjoint_reservations(blocks: &[Vec<u16>]) -> AssertionResult {
    let mut owners: HashMap<u16, usize> = HashMap::new();

    for (index, block) in blocks.iter().enumerate() {
        for &port in block {
            if let Some(previous) = owners.insert(port, index) {
                return AssertionResult::fail(
                    "Disjoint reservations",
                    &format!(
                        "Port {} granted to reservation {} and {}",
                        port, previous, index
                    ),
                );
            }
        }
    }

    AssertionResult::pass(&format!(
        "{} reservations share no port ({} ports total)",
        blocks.len(),
        owners.len()
    ))
}

/// Assert that a link's observed states form a legal history.
///
/// Legal: `Undisrupted`, then any number of `Disrupted, Undisrupted` pairs
/// (the final pair may be cut short), then optionally `Closed`, after which
/// nothing may follow. Repeated observations of one state are collapsed.
pub fn assert_link_history(history: &[LinkState]) -> AssertionResult {
    let mut collapsed: Vec<LinkState> = Vec::with_capacity(history.len());
    for &state in history {
        if collapsed.last() != Some(&state) {
            collapsed.push(state);
        }
    }

    let Some(first) = collapsed.first() else {
        return AssertionResult::pass("Empty link history");
    };
    if *first != LinkState::Undisrupted {
        return AssertionResult::fail(
            "Link history",
            &format!("History starts with {} instead of UNDISRUPTED", first),
        );
    }

    for (i, pair) in collapsed.windows(2).enumerate() {
        let legal = matches!(
            (pair[0], pair[1]),
            (LinkState::Undisrupted, LinkState::Disrupted)
                | (LinkState::Disrupted, LinkState::Undisrupted)
                | (LinkState::Undisrupted, LinkState::Closed)
                | (LinkState::Disrupted, LinkState::Closed)
        );
        if !legal {
            return AssertionResult::fail(
                "Link history",
                &format!(
                    "Illegal transition {} -> {} at step {}",
                    pair[0],
                    pair[1],
                    i + 1
                ),
            );
        }
    }

    AssertionResult::pass(&format!(
        "Legal link history of {} transitions",
        collapsed.len() - 1
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use LinkState::*;

    #[test]
    fn test_disjoint_reservations_pass() {
        let result = assert_disjoint_reservations(&[vec![1, 2], vec![3, 4], vec![10]]);
        assert!(result.passed);
    }

    #[test]
    fn test_disjoint_reservations_fail() {
        let result = assert_disjoint_reservations(&[vec![1, 2], vec![2, 3]]);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("Port 2"));
    }

    #[test]
    fn test_link_history_legal() {
        assert!(assert_link_history(&[Undisrupted]).passed);
        assert!(
            assert_link_history(&[Undisrupted, Disrupted, Undisrupted, Disrupted, Closed]).passed
        );
        assert!(assert_link_history(&[Undisrupted, Undisrupted, Closed, Closed]).passed);
        assert!(assert_link_history(&[]).passed);
    }

    #[test]
    fn test_link_history_illegal() {
        // Resurrection
        assert!(!assert_link_history(&[Undisrupted, Closed, Undisrupted]).passed);
        // Starts disrupted
        assert!(!assert_link_history(&[Disrupted, Undisrupted]).passed);
        let result = assert_link_history(&[Undisrupted, Closed, Disrupted]);
        assert!(result.failure_details.unwrap().contains("CLOSED -> DISRUPTED"));
    }
}
