use crate::errors::TaskAssertionError;

pub const DEFAULT_WILDCARD: char = '*';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPattern {
    Exact(String),
    /// Descriptor ended in the wildcard marker; holds the text before it.
    Prefix(String),
}

impl TaskPattern {
    pub fn parse(descriptor: &str, wildcard: char) -> Self {
        match descriptor.strip_suffix(wildcard) {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(descriptor.to_string()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == name,
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }

    fn mismatch(&self, index: usize, actual: &str) -> TaskAssertionError {
        match self {
            Self::Exact(expected) => TaskAssertionError::ExactMismatch {
                index,
                expected: expected.clone(),
                actual: actual.to_string(),
            },
            Self::Prefix(prefix) => TaskAssertionError::PrefixMismatch {
                index,
                expected_prefix: prefix.clone(),
                actual: actual.to_string(),
            },
        }
    }
}

/// Compare observed task names against expected descriptors, position by
/// position. Lengths must agree; the first mismatch in index order is
/// returned.
pub fn match_task_names<E, O>(
    expected: &[E],
    observed: &[O],
    wildcard: char,
) -> Result<(), TaskAssertionError>
where
    E: AsRef<str>,
    O: AsRef<str>,
{
    if expected.len() != observed.len() {
        return Err(TaskAssertionError::LengthMismatch {
            expected: expected.iter().map(|e| e.as_ref().to_string()).collect(),
            observed: observed.iter().map(|o| o.as_ref().to_string()).collect(),
        });
    }

    for (index, (descriptor, name)) in expected.iter().zip(observed).enumerate() {
        let pattern = TaskPattern::parse(descriptor.as_ref(), wildcard);
        if !pattern.matches(name.as_ref()) {
            return Err(pattern.mismatch(index, name.as_ref()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{match_task_names, TaskPattern, DEFAULT_WILDCARD};
    use crate::errors::TaskAssertionError;

    fn check(expected: &[&str], observed: &[&str]) -> Result<(), TaskAssertionError> {
        match_task_names(expected, observed, DEFAULT_WILDCARD)
    }

    #[test]
    fn identical_literal_sequences_match() {
        assert_eq!(check(&["crt_vm", "pwr_on_vm"], &["crt_vm", "pwr_on_vm"]), Ok(()));
        assert_eq!(check(&[], &[]), Ok(()));
    }

    #[test]
    fn wildcard_descriptor_matches_by_prefix() {
        assert_eq!(
            check(
                &["create_vm", "attach_disk*", "boot"],
                &["create_vm", "attach_disk_0", "boot"]
            ),
            Ok(())
        );
        assert_eq!(check(&["foo*"], &["foobar"]), Ok(()));
        assert_eq!(check(&["foo*"], &["foo"]), Ok(()));
        assert_eq!(check(&["*"], &["anything"]), Ok(()));
    }

    #[test]
    fn wildcard_prefix_mismatch_reports_index_and_names() {
        assert_eq!(
            check(&["crt_vm", "foo*"], &["crt_vm", "barfoo"]),
            Err(TaskAssertionError::PrefixMismatch {
                index: 1,
                expected_prefix: "foo".to_string(),
                actual: "barfoo".to_string(),
            })
        );
        // Observed name shorter than the prefix.
        assert!(matches!(
            check(&["connect_vol_*"], &["connect"]),
            Err(TaskAssertionError::PrefixMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn length_mismatch_wins_regardless_of_content() {
        assert_eq!(
            check(&["create_vm", "boot"], &["create_vm"]),
            Err(TaskAssertionError::LengthMismatch {
                expected: vec!["create_vm".to_string(), "boot".to_string()],
                observed: vec!["create_vm".to_string()],
            })
        );
        assert!(matches!(
            check(&[], &["x"]),
            Err(TaskAssertionError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn exact_mismatch_reports_first_offending_index() {
        assert_eq!(
            check(&["create_vm"], &["destroy_vm"]),
            Err(TaskAssertionError::ExactMismatch {
                index: 0,
                expected: "create_vm".to_string(),
                actual: "destroy_vm".to_string(),
            })
        );
        assert!(matches!(
            check(&["a", "b", "c"], &["a", "x", "y"]),
            Err(TaskAssertionError::ExactMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn literal_descriptor_is_not_a_prefix_match() {
        assert!(matches!(
            check(&["foo"], &["foobar"]),
            Err(TaskAssertionError::ExactMismatch { .. })
        ));
    }

    #[test]
    fn custom_wildcard_marker_is_honoured() {
        assert_eq!(
            TaskPattern::parse("connect_vol_%", '%'),
            TaskPattern::Prefix("connect_vol_".to_string())
        );
        assert_eq!(
            TaskPattern::parse("connect_vol_*", '%'),
            TaskPattern::Exact("connect_vol_*".to_string())
        );
    }
}
