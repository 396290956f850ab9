use crate::{ContainerRequest, Rule};

/// A request was denied by a rule.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Rejected {
    pub reason: String,
}

/// Evaluates rules against a request, in the order given.
///
/// The first rule that rejects the request ends evaluation. Rules that allow
/// the request do not end evaluation, so a later rule may still reject it.
pub fn evaluate<'r, I, R>(request: &ContainerRequest, rules: I) -> Result<(), Rejected>
where
    I: IntoIterator<Item = &'r R>,
    R: Rule + ?Sized + 'r,
{
    for rule in rules {
        let Some(decision) = rule.test(request) else {
            continue;
        };
        tracing::trace!(%rule, action = %decision.action, "Evaluated rule");

        if decision.is_reject() {
            let reason = decision
                .reason
                .unwrap_or_else(|| format!("Ephemeral container request rejected due to {rule}"));
            tracing::info!(image = request.image(), %rule, %reason, "Ephemeral container request rejected");
            return Err(Rejected { reason });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, ContainerImageRule, Decision};
    use pretty_assertions::assert_eq;
    use std::{fmt, sync::Arc};

    fn image_rule(names: &str, action: Action) -> Arc<dyn Rule> {
        Arc::new(ContainerImageRule::new(names, action).unwrap())
    }

    #[derive(Debug)]
    struct Fixed(Option<Decision>);

    impl fmt::Display for Fixed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("Fixed")
        }
    }

    impl Rule for Fixed {
        fn test(&self, _: &ContainerRequest) -> Option<Decision> {
            self.0.clone()
        }
    }

    #[test]
    fn empty_rules_allow() {
        let rules: Vec<Arc<dyn Rule>> = vec![];
        assert_eq!(evaluate(&ContainerRequest::new("maven"), &rules), Ok(()));
    }

    #[test]
    fn unmatched_reject_rule_does_not_block() {
        let rules = vec![
            image_rule("*/node", Action::Reject),
            image_rule("*/maven", Action::Allow),
        ];
        assert_eq!(evaluate(&ContainerRequest::new("maven"), &rules), Ok(()));
    }

    #[test]
    fn unmatched_allow_rule_rejects() {
        let rules = vec![image_rule("*/node", Action::Allow)];
        let err = evaluate(&ContainerRequest::new("maven"), &rules).unwrap_err();
        assert_eq!(err.reason, "Image 'maven' not in allow list");
    }

    #[test]
    fn first_reject_wins_over_later_allow() {
        let rules = vec![
            image_rule("*/maven", Action::Reject),
            image_rule("*", Action::Allow),
        ];
        let err = evaluate(&ContainerRequest::new("maven"), &rules).unwrap_err();
        assert!(err.reason.contains("disallowed"), "{}", err.reason);
    }

    #[test]
    fn allow_does_not_short_circuit() {
        let rules = vec![
            image_rule("*", Action::Allow),
            image_rule("*/maven", Action::Reject),
        ];
        assert!(evaluate(&ContainerRequest::new("maven"), &rules).is_err());
    }

    #[test]
    fn rejection_without_reason_names_the_rule() {
        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(Fixed(None)),
            Box::new(Fixed(Some(Decision::from(Action::Reject)))),
        ];
        let err = evaluate(&ContainerRequest::new("maven"), &rules).unwrap_err();
        assert_eq!(err.reason, "Ephemeral container request rejected due to Fixed");
    }

    #[test]
    fn evaluation_is_repeatable() {
        let req = ContainerRequest::new("maven");
        let rules = vec![image_rule("*/node", Action::Allow)];
        let first = evaluate(&req, &rules);
        let second = evaluate(&req, &rules);
        assert_eq!(first, second);
    }
}
