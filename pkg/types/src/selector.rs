use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Label selector (pods) ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelSelectorRequirement {
    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        match self.operator {
            SelectorOperator::In => labels.get(&self.key).is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => labels
                .get(&self.key)
                .is_none_or(|v| !self.values.contains(v)),
            SelectorOperator::Exists => labels.contains_key(&self.key),
            SelectorOperator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            bail!("selector requirement has an empty key");
        }
        match self.operator {
            SelectorOperator::In | SelectorOperator::NotIn if self.values.is_empty() => {
                bail!(
                    "selector requirement on '{}': {:?} needs at least one value",
                    self.key,
                    self.operator
                )
            }
            SelectorOperator::Exists | SelectorOperator::DoesNotExist
                if !self.values.is_empty() =>
            {
                bail!(
                    "selector requirement on '{}': {:?} takes no values",
                    self.key,
                    self.operator
                )
            }
            _ => Ok(()),
        }
    }
}

/// Label query over pods. All `match_labels` pairs and all
/// `match_expressions` must hold for a match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
    #[serde(default)]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// A selector with no criteria. Matches every object.
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn from_labels(labels: HashMap<String, String>) -> Self {
        Self {
            match_labels: labels,
            match_expressions: Vec::new(),
        }
    }

    /// True when the selector has no criteria and therefore matches everything.
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|lv| lv == v))
            && self.match_expressions.iter().all(|r| r.matches(labels))
    }

    pub fn validate(&self) -> Result<()> {
        for requirement in &self.match_expressions {
            requirement.validate()?;
        }
        Ok(())
    }
}

// --- Node affinity ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl NodeSelectorRequirement {
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            NodeSelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            NodeSelectorOperator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            NodeSelectorOperator::Exists => value.is_some(),
            NodeSelectorOperator::DoesNotExist => value.is_none(),
            NodeSelectorOperator::Gt | NodeSelectorOperator::Lt => {
                let (Some(actual), Some(bound)) = (
                    value.and_then(|v| v.parse::<i64>().ok()),
                    self.single_integer(),
                ) else {
                    return false;
                };
                if self.operator == NodeSelectorOperator::Gt {
                    actual > bound
                } else {
                    actual < bound
                }
            }
        }
    }

    fn single_integer(&self) -> Option<i64> {
        match self.values.as_slice() {
            [v] => v.parse().ok(),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            bail!("node selector requirement has an empty key");
        }
        match self.operator {
            NodeSelectorOperator::In | NodeSelectorOperator::NotIn => {
                if self.values.is_empty() {
                    bail!(
                        "node selector requirement on '{}': {:?} needs at least one value",
                        self.key,
                        self.operator
                    );
                }
            }
            NodeSelectorOperator::Exists | NodeSelectorOperator::DoesNotExist => {
                if !self.values.is_empty() {
                    bail!(
                        "node selector requirement on '{}': {:?} takes no values",
                        self.key,
                        self.operator
                    );
                }
            }
            NodeSelectorOperator::Gt | NodeSelectorOperator::Lt => {
                if self.single_integer().is_none() {
                    bail!(
                        "node selector requirement on '{}': {:?} needs exactly one integer value, got {:?}",
                        self.key,
                        self.operator,
                        self.values
                    );
                }
            }
        }
        Ok(())
    }
}

/// A conjunction of requirements. An empty term matches no node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

impl NodeSelectorTerm {
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        !self.match_expressions.is_empty()
            && self.match_expressions.iter().all(|r| r.matches(labels))
    }
}

/// A disjunction of terms. An empty term list matches no node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSelector {
    #[serde(default)]
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

impl NodeSelector {
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.node_selector_terms.iter().any(|t| t.matches(labels))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeAffinity {
    /// Hard placement requirement. Nodes that stop matching after a pod is
    /// placed keep the pod only as long as the DaemonSet controller allows.
    #[serde(default)]
    pub required_during_scheduling_ignored_during_execution: Option<NodeSelector>,
}

impl NodeAffinity {
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.required_during_scheduling_ignored_during_execution
            .as_ref()
            .is_none_or(|selector| selector.matches(labels))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(selector) = &self.required_during_scheduling_ignored_during_execution {
            for term in &selector.node_selector_terms {
                for requirement in &term.match_expressions {
                    requirement.validate()?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node_req(key: &str, operator: NodeSelectorOperator, values: &[&str]) -> NodeSelectorRequirement {
        NodeSelectorRequirement {
            key: key.to_string(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn empty_selector_selects_everything() {
        let selector = LabelSelector::everything();
        assert!(selector.is_empty());
        assert!(selector.matches(&labels(&[("bang", "boom")])));
        assert!(selector.matches(&HashMap::new()));
    }

    #[test]
    fn match_labels_require_every_pair() {
        let selector = LabelSelector::from_labels(labels(&[
            ("name", "simple-daemon"),
            ("type", "production"),
        ]));
        assert!(!selector.is_empty());
        assert!(selector.matches(&labels(&[
            ("name", "simple-daemon"),
            ("type", "production"),
            ("extra", "x"),
        ])));
        assert!(!selector.matches(&labels(&[("name", "simple-daemon"), ("type", "test")])));
        assert!(!selector.matches(&labels(&[("name", "simple-daemon")])));
    }

    #[test]
    fn match_expressions() {
        let selector = LabelSelector {
            match_labels: HashMap::new(),
            match_expressions: vec![
                LabelSelectorRequirement {
                    key: "tier".to_string(),
                    operator: SelectorOperator::In,
                    values: vec!["infra".to_string(), "system".to_string()],
                },
                LabelSelectorRequirement {
                    key: "canary".to_string(),
                    operator: SelectorOperator::DoesNotExist,
                    values: vec![],
                },
            ],
        };
        assert!(selector.matches(&labels(&[("tier", "system")])));
        assert!(!selector.matches(&labels(&[("tier", "web")])));
        assert!(!selector.matches(&labels(&[("tier", "infra"), ("canary", "true")])));
        assert!(selector.validate().is_ok());
    }

    #[test]
    fn invalid_label_requirements() {
        let selector = LabelSelector {
            match_labels: HashMap::new(),
            match_expressions: vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: SelectorOperator::In,
                values: vec![],
            }],
        };
        assert!(selector.validate().is_err());
    }

    #[test]
    fn affinity_terms_are_ored() {
        let affinity = NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![
                    NodeSelectorTerm {
                        match_expressions: vec![node_req("color", NodeSelectorOperator::In, &["blue"])],
                    },
                    NodeSelectorTerm {
                        match_expressions: vec![node_req("gpu", NodeSelectorOperator::Exists, &[])],
                    },
                ],
            }),
        };
        assert!(affinity.matches(&labels(&[("color", "blue")])));
        assert!(affinity.matches(&labels(&[("gpu", "a100")])));
        assert!(!affinity.matches(&labels(&[("color", "red")])));
    }

    #[test]
    fn empty_affinity_terms_match_nothing() {
        let affinity = NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector::default()),
        };
        assert!(!affinity.matches(&labels(&[("color", "blue")])));
        assert!(NodeAffinity::default().matches(&HashMap::new()));
        assert!(!NodeSelectorTerm::default().matches(&HashMap::new()));
    }

    #[test]
    fn numeric_operators() {
        let gt = node_req("cores", NodeSelectorOperator::Gt, &["8"]);
        assert!(gt.matches(&labels(&[("cores", "16")])));
        assert!(!gt.matches(&labels(&[("cores", "8")])));
        assert!(!gt.matches(&labels(&[("cores", "many")])));
        assert!(!gt.matches(&HashMap::new()));

        let lt = node_req("cores", NodeSelectorOperator::Lt, &["8"]);
        assert!(lt.matches(&labels(&[("cores", "4")])));
        assert!(!lt.matches(&labels(&[("cores", "8")])));
    }

    #[test]
    fn malformed_node_requirements() {
        assert!(node_req("cores", NodeSelectorOperator::Gt, &["eight"]).validate().is_err());
        assert!(node_req("cores", NodeSelectorOperator::Lt, &["1", "2"]).validate().is_err());
        assert!(node_req("color", NodeSelectorOperator::In, &[]).validate().is_err());
        assert!(node_req("gpu", NodeSelectorOperator::Exists, &["x"]).validate().is_err());
        assert!(node_req("", NodeSelectorOperator::Exists, &[]).validate().is_err());
        assert!(node_req("color", NodeSelectorOperator::NotIn, &["red"]).validate().is_ok());
    }
}
