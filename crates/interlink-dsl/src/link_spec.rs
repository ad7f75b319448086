//! `LinkSpecification`: the declarative specification tree.
//!
//! A node is either
//! - a **leaf**: no children, `filter_expression = measure(path1, path2)`, or
//! - an **internal node**: an operator over an ordered list of children and
//!   no filter expression.
//!
//! Every node carries the minimum combined confidence it must reach
//! (`threshold`). Thresholds are assigned top-down while parsing: the literal
//! thresholds of `AND`/`OR`/`XOR`/`MINUS` terms, the parent's threshold for
//! `MIN`/`MAX`, and the back-propagated bounds of `ADD`:
//!
//! ```text
//! c1·s1 + c2·s2 ≥ θ  with s1, s2 ≤ 1   ⇒   s1 ≥ (θ − c2) / c1,   s2 ≥ (θ − c1) / c2
//! ```
//!
//! Propagated thresholds are stored exactly as computed. A negative child
//! threshold makes the child trivially satisfied (`is_empty`), a threshold
//! above `1` makes it unsatisfiable; planners decide how to execute both.
//!
//! The bounds only prune. An `ADD` node is an `AND` node that also keeps its
//! coefficients (`weights`); its canonical expression carries them, and the
//! pairs surviving both children still have to reach `θ` under the weighted
//! sum (`weighted_expression`).
//!
//! Trees own their children; there is no parent pointer. Navigation that
//! needs ancestors (`leaf_paths`) threads the ancestor context through the
//! traversal instead.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::digest::Fnv1a64;
use crate::expr::{
    parse_atomic, ExpressionParser, GrammarParser, ParsedExpression, SpecOperator, SpecParseError,
};

/// Two leaf thresholds closer than this are considered equal.
pub const THRESHOLD_TOLERANCE: f64 = 0.001;

/// Boolean-like operator of an internal specification node.
///
/// The declaration order is the operator ordering used by
/// [`LinkSpecification::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOperator {
    And,
    Or,
    Xor,
    Minus,
}

impl LogicOperator {
    pub fn keyword(self) -> &'static str {
        match self {
            LogicOperator::And => "AND",
            LogicOperator::Or => "OR",
            LogicOperator::Xor => "XOR",
            LogicOperator::Minus => "MINUS",
        }
    }

    /// `MINUS` is the only operator whose child order changes the result.
    pub fn is_commutative(self) -> bool {
        !matches!(self, LogicOperator::Minus)
    }
}

impl std::fmt::Display for LogicOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpecification {
    operator: Option<LogicOperator>,
    threshold: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<LinkSpecification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter_expression: Option<String>,
    #[serde(default)]
    full_expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    atomic_measure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    property1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    property2: Option<String>,
    /// `ADD` coefficients of the left and right child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weights: Option<(f64, f64)>,
}

impl Default for LinkSpecification {
    fn default() -> Self {
        Self {
            operator: None,
            threshold: -1.0,
            children: Vec::new(),
            filter_expression: None,
            full_expression: String::new(),
            atomic_measure: None,
            property1: None,
            property2: None,
            weights: None,
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

impl LinkSpecification {
    /// An empty specification (no expression, negative threshold).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `expression` with the built-in grammar and target threshold `theta`.
    pub fn parse(expression: &str, theta: f64) -> Result<Self, SpecParseError> {
        Self::parse_with(&GrammarParser, expression, theta)
    }

    /// Parse `expression` with a caller-supplied expression parser.
    pub fn parse_with(
        parser: &dyn ExpressionParser,
        expression: &str,
        theta: f64,
    ) -> Result<Self, SpecParseError> {
        let expression = expression.trim();
        match parser.parse(expression, theta)? {
            ParsedExpression::Atomic(atom) => {
                let mut arguments = atom.arguments.into_iter();
                Ok(Self {
                    operator: None,
                    threshold: theta,
                    children: Vec::new(),
                    filter_expression: Some(expression.to_string()),
                    full_expression: expression.to_string(),
                    atomic_measure: Some(atom.measure),
                    property1: arguments.next(),
                    property2: arguments.next(),
                    weights: None,
                })
            }
            ParsedExpression::Composite(c) => {
                let (operator, left_theta, right_theta) = match c.operator {
                    SpecOperator::And => (LogicOperator::And, c.threshold1, c.threshold2),
                    SpecOperator::Or => (LogicOperator::Or, c.threshold1, c.threshold2),
                    SpecOperator::Xor => (LogicOperator::Xor, c.threshold1, c.threshold2),
                    SpecOperator::Minus => (LogicOperator::Minus, c.threshold1, c.threshold2),
                    SpecOperator::Min => (LogicOperator::And, theta, theta),
                    SpecOperator::Max => (LogicOperator::Or, theta, theta),
                    SpecOperator::Add => (
                        LogicOperator::And,
                        (theta - c.coef2) / c.coef1,
                        (theta - c.coef1) / c.coef2,
                    ),
                };

                let weights = (c.operator == SpecOperator::Add).then_some((c.coef1, c.coef2));
                let left = Self::parse_with(parser, &c.term1, left_theta)?;
                let right = Self::parse_with(parser, &c.term2, right_theta)?;
                let full_expression =
                    canonical_expression(c.operator.keyword(), weights, &left, &right);

                Ok(Self {
                    operator: Some(operator),
                    threshold: theta,
                    children: vec![left, right],
                    filter_expression: None,
                    full_expression,
                    atomic_measure: None,
                    property1: None,
                    property2: None,
                    weights,
                })
            }
        }
    }

    /// Build a leaf `measure(prop1,prop2)` at `threshold`.
    pub fn atomic(measure: &str, prop1: &str, prop2: &str, threshold: f64) -> Self {
        let mut spec = Self::new();
        spec.set_atomic_filter_expression(measure, prop1, prop2);
        spec.threshold = threshold;
        spec
    }

    /// Build an internal node; the canonical expression is derived from the children.
    pub fn composite(
        operator: LogicOperator,
        threshold: f64,
        children: Vec<LinkSpecification>,
    ) -> Self {
        let mut spec = Self {
            operator: Some(operator),
            threshold,
            children,
            ..Self::default()
        };
        spec.refresh_full_expression();
        spec
    }

    /// Turn this node into the leaf `measure(prop1,prop2)`.
    pub fn set_atomic_filter_expression(&mut self, measure: &str, prop1: &str, prop2: &str) {
        let expression = format!("{measure}({prop1},{prop2})");
        self.operator = None;
        self.weights = None;
        self.children.clear();
        self.atomic_measure = Some(measure.to_string());
        self.property1 = Some(prop1.to_string());
        self.property2 = Some(prop2.to_string());
        self.full_expression = expression.clone();
        self.filter_expression = Some(expression);
    }

    /// Append a child. A weighted sum covers exactly two terms, so this
    /// drops any `ADD` weights.
    pub fn add_child(&mut self, child: LinkSpecification) {
        self.filter_expression = None;
        self.weights = None;
        self.atomic_measure = None;
        self.property1 = None;
        self.property2 = None;
        self.children.push(child);
        self.refresh_full_expression();
    }

    pub fn set_operator(&mut self, operator: LogicOperator) {
        self.operator = Some(operator);
        self.weights = None;
        self.refresh_full_expression();
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn refresh_full_expression(&mut self) {
        if self.is_atomic() {
            return;
        }
        let keyword = self.operator.map(LogicOperator::keyword).unwrap_or("");
        self.full_expression = match self.children.as_slice() {
            [left, right] => canonical_expression(keyword, None, left, right),
            children => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|c| format!("{}|{}", c.full_expression, c.threshold))
                    .collect();
                format!("{keyword}({})", parts.join(", "))
            }
        };
    }
}

fn canonical_expression(
    keyword: &str,
    weights: Option<(f64, f64)>,
    left: &LinkSpecification,
    right: &LinkSpecification,
) -> String {
    match weights {
        Some((c1, c2)) => format!(
            "{keyword}({c1}*{}|{}, {c2}*{}|{})",
            left.full_expression, left.threshold, right.full_expression, right.threshold
        ),
        None => format!(
            "{keyword}({}|{}, {}|{})",
            left.full_expression, left.threshold, right.full_expression, right.threshold
        ),
    }
}

// ============================================================================
// Accessors and derived operations
// ============================================================================

impl LinkSpecification {
    pub fn operator(&self) -> Option<LogicOperator> {
        self.operator
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn children(&self) -> &[LinkSpecification] {
        &self.children
    }

    pub fn filter_expression(&self) -> Option<&str> {
        self.filter_expression.as_deref()
    }

    pub fn full_expression(&self) -> &str {
        &self.full_expression
    }

    /// `ADD` coefficients, `None` for every other node.
    pub fn weights(&self) -> Option<(f64, f64)> {
        self.weights
    }

    /// The expression an `ADD` node re-scores its pairs with.
    pub fn weighted_expression(&self) -> Option<&str> {
        self.weights.map(|_| self.full_expression.as_str())
    }

    pub fn property1(&self) -> Option<&str> {
        self.property1.as_deref()
    }

    pub fn property2(&self) -> Option<&str> {
        self.property2.as_deref()
    }

    /// Measure name of a leaf; `None` for internal nodes.
    pub fn atomic_measure(&self) -> Option<String> {
        if !self.is_atomic() {
            return None;
        }
        if let Some(measure) = self.atomic_measure.as_ref().filter(|m| !m.is_empty()) {
            return Some(measure.clone());
        }
        let expression = self.filter_expression.as_ref()?;
        let end = expression.find('(').unwrap_or(expression.len());
        Some(expression[..end].trim().to_string())
    }

    pub fn is_atomic(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        if self.threshold <= 0.0 {
            return true;
        }
        self.filter_expression.is_none() && self.children.is_empty()
    }

    /// 0 if empty, 1 if atomic, else 1 + the sizes of all children.
    pub fn size(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        if self.is_atomic() {
            return 1;
        }
        1 + self.children.iter().map(LinkSpecification::size).sum::<usize>()
    }

    /// Atomic descendants in pre-order (a leaf returns itself).
    pub fn all_leaves(&self) -> Vec<&LinkSpecification> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a LinkSpecification>) {
        if self.is_atomic() {
            out.push(self);
        } else {
            for child in &self.children {
                child.collect_leaves(out);
            }
        }
    }

    /// Operator path of every leaf, e.g. `": AND->left: OR->right"`.
    pub fn leaf_paths(&self) -> Vec<(String, &LinkSpecification)> {
        let mut out = Vec::new();
        self.collect_leaf_paths(String::new(), &mut out);
        out
    }

    fn collect_leaf_paths<'a>(&'a self, path: String, out: &mut Vec<(String, &'a LinkSpecification)>) {
        if self.is_atomic() {
            out.push((path, self));
            return;
        }
        let keyword = self.operator.map(LogicOperator::keyword).unwrap_or("null");
        for (i, child) in self.children.iter().enumerate() {
            let side = if i == 0 { "left" } else { "right" };
            child.collect_leaf_paths(format!("{path}: {keyword}->{side}"), out);
        }
    }

    /// True when two leaves compare the same pair of properties.
    pub fn contains_redundant_properties(&self) -> bool {
        let mut seen = HashSet::new();
        for leaf in self.all_leaves() {
            let key = format!(
                "{}_{}",
                leaf.property1().unwrap_or_default(),
                leaf.property2().unwrap_or_default()
            );
            if !seen.insert(key) {
                return true;
            }
        }
        false
    }

    /// Compact leaf rendering: `measure(p1,p2)|0.90` with properties cut
    /// after their last `#` (else last `/`).
    pub fn shortened_filter_expression(&self) -> Option<String> {
        let expression = self.filter_expression.as_ref()?;
        if expression.is_empty() || !self.is_atomic() {
            return Some(expression.clone());
        }
        let Ok(atom) = parse_atomic(expression) else {
            return Some(expression.clone());
        };
        let shorten = |p: &str| -> String {
            if let Some(i) = p.rfind('#') {
                p[i + 1..].to_string()
            } else if let Some(i) = p.rfind('/') {
                p[i + 1..].to_string()
            } else {
                p.to_string()
            }
        };
        let props: Vec<String> = atom.arguments.iter().map(|p| shorten(p)).collect();
        Some(format!(
            "{}({})|{:.2}",
            atom.measure,
            props.join(","),
            self.threshold
        ))
    }

    pub fn to_string_one_line(&self) -> String {
        let head = format!(
            "({}, {}, {})",
            self.shortened_filter_expression()
                .unwrap_or_else(|| "null".to_string()),
            self.threshold,
            self.operator
                .map(LogicOperator::keyword)
                .unwrap_or("null")
        );
        if self.is_atomic() {
            return head;
        }
        let children: Vec<String> = self
            .children
            .iter()
            .map(LinkSpecification::to_string_one_line)
            .collect();
        format!("{head}{{{}}}", children.join(","))
    }

    /// Total order used by specification search.
    ///
    /// - larger trees order *before* smaller ones;
    /// - equal-size leaves order by threshold, then by filter expression
    ///   (case-insensitive);
    /// - equal-size internal nodes with the same operator order by leaf
    ///   count, then leaf-by-leaf;
    /// - otherwise by operator.
    pub fn compare(&self, other: &Self) -> Ordering {
        match other.size().cmp(&self.size()) {
            Ordering::Equal => {}
            ord => return ord,
        }
        if self.is_empty() && other.is_empty() {
            return Ordering::Equal;
        }

        if self.is_atomic() && other.is_atomic() {
            return self
                .threshold
                .partial_cmp(&other.threshold)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    match (&self.filter_expression, &other.filter_expression) {
                        (None, None) => Ordering::Equal,
                        (None, Some(_)) => Ordering::Less,
                        (Some(_), None) => Ordering::Greater,
                        (Some(a), Some(b)) => compare_ignore_case(a, b),
                    }
                });
        }

        if self.operator != other.operator {
            return self.operator.cmp(&other.operator);
        }

        let leaves = self.all_leaves();
        let other_leaves = other.all_leaves();
        if leaves.len() != other_leaves.len() {
            return leaves.len().cmp(&other_leaves.len());
        }
        leaves
            .iter()
            .zip(other_leaves.iter())
            .map(|(a, b)| a.compare(b))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Deterministic structural hash, consistent with `==`.
    ///
    /// Leaves hash their lower-cased filter expression only (thresholds are
    /// compared with a tolerance, so they cannot take part). Internal nodes
    /// hash their operator, whether they are weighted, and the sorted,
    /// de-duplicated hashes of their children, matching the set semantics
    /// of equality.
    pub fn structural_hash(&self) -> u64 {
        let mut h = Fnv1a64::new();
        if self.is_atomic() {
            h.write(b"leaf:");
            if let Some(expression) = &self.filter_expression {
                h.write(expression.to_ascii_lowercase().as_bytes());
            }
        } else {
            h.write(b"node:");
            h.write(
                self.operator
                    .map(LogicOperator::keyword)
                    .unwrap_or("")
                    .as_bytes(),
            );
            if self.weights.is_some() {
                h.write(b":weighted");
            }
            let mut child_hashes: Vec<u64> = self
                .children
                .iter()
                .map(LinkSpecification::structural_hash)
                .collect();
            child_hashes.sort_unstable();
            child_hashes.dedup();
            for c in child_hashes {
                h.write_u64(c);
            }
        }
        h.finish()
    }
}

fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.chars().map(|c| c.to_ascii_lowercase()))
}

fn contains_equal(haystack: &[LinkSpecification], needle: &LinkSpecification) -> bool {
    haystack.iter().any(|c| c == needle)
}

// ============================================================================
// Equality, hashing, display
// ============================================================================

impl PartialEq for LinkSpecification {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_atomic(), other.is_atomic()) {
            (true, true) => match (&self.filter_expression, &other.filter_expression) {
                (None, None) => true,
                (Some(a), Some(b)) => {
                    a.eq_ignore_ascii_case(b)
                        && (self.threshold - other.threshold).abs() < THRESHOLD_TOLERANCE
                }
                _ => false,
            },
            (false, false) => {
                self.operator == other.operator
                    && self.weights.is_some() == other.weights.is_some()
                    && self.children.iter().all(|c| contains_equal(&other.children, c))
                    && other.children.iter().all(|c| contains_equal(&self.children, c))
            }
            _ => false,
        }
    }
}

impl Eq for LinkSpecification {}

impl Hash for LinkSpecification {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl std::fmt::Display for LinkSpecification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn write_node(
            node: &LinkSpecification,
            depth: usize,
            f: &mut std::fmt::Formatter<'_>,
        ) -> std::fmt::Result {
            let indent = "  ".repeat(depth);
            if depth > 0 {
                write!(f, "\n{indent}-> ")?;
            }
            match (&node.filter_expression, node.operator) {
                (Some(expression), _) => write!(f, "{expression} | {}", node.threshold)?,
                (None, Some(op)) => match node.weights {
                    Some((c1, c2)) => write!(f, "{op} [{c1}, {c2}] | {}", node.threshold)?,
                    None => write!(f, "{op} | {}", node.threshold)?,
                },
                (None, None) => write!(f, "<empty> | {}", node.threshold)?,
            }
            for child in &node.children {
                write_node(child, depth + 1, f)?;
            }
            Ok(())
        }
        write_node(self, 0, f)
    }
}
